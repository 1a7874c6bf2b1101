//! Shared harness for view integration tests.

use facetdb_collatable::Collatable;
use facetdb_core::{
    CoreResult, Document, DocumentSource, Indexer, QueryOptions, View, ViewConfig,
};
use facetdb_storage::{KeyStore, MemoryKeyStore};
use facetdb_testkit::DocStore;
use std::sync::Arc;

/// Opens a view named `name` over a fresh in-memory store, returning both.
pub fn open_view(name: &str, version: &str) -> (Arc<MemoryKeyStore>, Arc<View>) {
    let store = Arc::new(MemoryKeyStore::new());
    let view = View::open(
        store.clone() as Arc<dyn KeyStore>,
        name,
        version,
        ViewConfig::default(),
    )
    .expect("open view");
    (store, view)
}

/// Runs one full index pass over `views`, applying `map` to every live
/// document and retracting deleted ones.
pub fn run_index<F>(source: &DocStore, views: &[Arc<View>], map: F) -> CoreResult<()>
where
    F: Fn(&Document) -> (Vec<Collatable>, Vec<Vec<u8>>),
{
    let source: Arc<dyn DocumentSource> = Arc::new(source.clone());
    let mut indexer = Indexer::begin(source, views.to_vec())?;
    let docs: Vec<Document> = indexer.enumerate_documents()?.collect::<Result<_, _>>()?;
    for doc in &docs {
        for view_number in 0..views.len() {
            if indexer.should_index_document(view_number, doc)? {
                if doc.deleted {
                    indexer.emit(doc, view_number, &[], &[])?;
                } else {
                    let (keys, values) = map(doc);
                    indexer.emit(doc, view_number, &keys, &values)?;
                }
            }
        }
    }
    indexer.end(true)
}

/// Collects `(key bytes, doc_id, value)` for every row of a query.
pub fn collect_rows(
    view: &Arc<View>,
    options: QueryOptions,
) -> Vec<(Vec<u8>, String, Vec<u8>)> {
    let mut enumerator = view.query(options).expect("query");
    let mut rows = Vec::new();
    while enumerator.next().expect("next") {
        rows.push((
            enumerator.key_data().to_vec(),
            enumerator.doc_id().to_string(),
            enumerator.value().to_vec(),
        ));
    }
    rows
}

/// Snapshot of the index-row records in a host store, for asserting that
/// re-indexing performed no row mutations.
pub fn row_records(store: &MemoryKeyStore) -> Vec<(Vec<u8>, Vec<u8>, u64)> {
    store
        .dump()
        .into_iter()
        .filter(|record| record.key.first() == Some(&b'r'))
        .map(|record| (record.key, record.value, record.sequence.as_u64()))
        .collect()
}
