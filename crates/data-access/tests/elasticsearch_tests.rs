//! Elasticsearch client integration tests.
//!
//! Configuration tests run without a cluster. The `es_integration` module
//! starts a real Elasticsearch in Docker via testcontainers.
//!
//! Run with: `cargo test -p helios-data-access --features elasticsearch --test elasticsearch_tests`

#![cfg(feature = "elasticsearch")]

use helios_data_access::backends::elasticsearch::ElasticsearchClient;
use helios_data_access::config::{SearchAuth, SearchConfig};
use helios_data_access::core::{BackendKind, SearchClient};

#[test]
fn test_client_creation_does_not_connect() {
    let client = ElasticsearchClient::new(SearchConfig::default()).unwrap();
    assert_eq!(client.kind(), BackendKind::Elasticsearch);
}

#[test]
fn test_client_with_auth() {
    let config = SearchConfig::default().with_auth(SearchAuth::Basic {
        username: "elastic".to_string(),
        password: "changeme".to_string(),
    });
    assert!(ElasticsearchClient::new(config).is_ok());
}

#[test]
fn test_invalid_node_url_is_a_backend_error() {
    let config = SearchConfig::default().with_nodes(["not a url"]);
    assert!(ElasticsearchClient::new(config).is_err());
}

/// Skip if no Docker:
///   cargo test -p helios-data-access --features elasticsearch -- --skip es_integration
mod es_integration {
    use std::sync::Arc;

    use helios_data_access::backends::elasticsearch::ElasticsearchClient;
    use helios_data_access::backends::memory::MemoryColumnStore;
    use helios_data_access::config::SearchConfig;
    use helios_data_access::types::{AggregationKind, Filter, OperatorSet, RangeOp, SearchRequest};
    use helios_data_access::{DataAccess, DataAccessConfig, Record};
    use serde_json::{Value, json};
    use testcontainers::ImageExt;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::elastic_search::ElasticSearch;
    use tokio::sync::OnceCell;

    /// Shared Elasticsearch container reused across all tests in this module.
    struct SharedEs {
        url: String,
        /// Kept alive for the duration of the test binary.
        _container: testcontainers::ContainerAsync<ElasticSearch>,
    }

    static SHARED_ES: OnceCell<SharedEs> = OnceCell::const_new();

    async fn shared_es() -> &'static SharedEs {
        SHARED_ES
            .get_or_init(|| async {
                let run_id = std::env::var("GITHUB_RUN_ID").unwrap_or_default();
                let container = ElasticSearch::default()
                    .with_env_var("ES_JAVA_OPTS", "-Xms256m -Xmx256m")
                    .with_label("github.run_id", &run_id)
                    .with_startup_timeout(std::time::Duration::from_secs(120))
                    .start()
                    .await
                    .expect("Failed to start Elasticsearch container");
                let port = container
                    .get_host_port_ipv4(9200)
                    .await
                    .expect("Failed to get host port");
                let host = container.get_host().await.expect("Failed to get host");
                SharedEs {
                    url: format!("http://{}:{}", host, port),
                    _container: container,
                }
            })
            .await
    }

    /// Dynamic mappings give every string a `.keyword` sub-field.
    async fn setup() -> (DataAccess, Arc<ElasticsearchClient>, String) {
        let es = shared_es().await;
        let search = SearchConfig::default()
            .with_nodes([es.url.clone()])
            .with_raw_suffix(".keyword");
        let client = Arc::new(ElasticsearchClient::new(search.clone()).expect("client"));
        let access = DataAccess::with_backends(
            DataAccessConfig::default().with_search(search),
            Arc::new(MemoryColumnStore::new()),
            client.clone(),
        )
        .expect("data access");
        let index = format!("people_{}", uuid::Uuid::new_v4().simple());
        (access, client, index)
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object literal")
    }

    async fn seed(access: &DataAccess, client: &ElasticsearchClient, index: &str) {
        let people = [
            json!({"id": "p1", "name": "ann", "age": "17", "city": "pune"}),
            json!({"id": "p2", "name": "bob", "age": "18", "city": "goa"}),
            json!({"id": "p3", "name": "cid", "age": "64", "city": "pune"}),
            json!({"id": "p4", "name": "dee", "age": "65", "city": "delhi"}),
        ];
        let documents: Vec<Record> = people.into_iter().map(record).collect();
        access.bulk_insert(index, &documents).await.expect("bulk insert");
        client.refresh(index).await.expect("refresh");
    }

    #[tokio::test]
    async fn es_integration_range_and_count() {
        let (access, client, index) = setup().await;
        seed(&access, &client, &index).await;

        let request = SearchRequest::new()
            .with_filters(Filter::new().with(
                "age",
                OperatorSet::new()
                    .range(RangeOp::Gte, "18")
                    .range(RangeOp::Lte, "64"),
            ))
            .with_limit(1);
        let response = access.search(&index, &request).await.unwrap();

        assert_eq!(response.count, 2);
        assert_eq!(response.records.len(), 1);
    }

    #[tokio::test]
    async fn es_integration_terms_facet() {
        let (access, client, index) = setup().await;
        seed(&access, &client, &index).await;

        let request = SearchRequest::new().with_facet("city", AggregationKind::Terms);
        let response = access.search(&index, &request).await.unwrap();

        let city = response.facet("city").unwrap();
        assert_eq!(city.values[0].name, json!("pune"));
        assert_eq!(city.values[0].count, 2);
    }

    #[tokio::test]
    async fn es_integration_document_lifecycle() {
        let (access, _client, index) = setup().await;

        access
            .save(&index, Some("n1"), &record(json!({"title": "first"})))
            .await
            .unwrap();
        assert!(
            access
                .update(&index, "n1", &record(json!({"pinned": true})))
                .await
                .unwrap()
        );
        let stored = access.get_by_id(&index, "n1").await.unwrap();
        assert_eq!(stored["title"], json!("first"));
        assert_eq!(stored["pinned"], json!(true));

        assert!(!access.update(&index, "n2", &record(json!({"x": 1}))).await.unwrap());
        assert!(access.upsert(&index, "n2", &record(json!({"x": 1}))).await.unwrap());

        let found = access.get_by_ids(&index, &["n1", "n2", "nx"], &[]).await.unwrap();
        assert_eq!(found.len(), 2);

        assert!(access.delete(&index, "n1").await.unwrap());
        assert!(!access.delete(&index, "n1").await.unwrap());
        assert!(access.get_by_id(&index, "n1").await.unwrap().is_empty());
        assert!(access.health_check().await.unwrap());
    }
}
