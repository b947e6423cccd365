//! Catalog crawl drivers
//!
//! Each source is crawled listing page by listing page; the entity ids a
//! page yields are ingested concurrently under one shared semaphore, so no
//! more than the configured number of detail fetches is in flight at once.
//! Entity failures are logged and skipped; a listing page failure skips the
//! page. HMDB reconciliation assumes the FooDB catalog is already in the
//! store, so the HMDB driver refuses to start without a recorded FooDB
//! completion.

use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use crate::ingest::Pipeline;
use crate::parse::{extract_food_catalog, extract_foodb_ids, extract_hmdb_ids};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// HTTP client wrapper shared by listing and detail fetches
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// GET a page as text; a non-success status is an error
    pub async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching {url}");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Crawl the FooDB compound catalog and record completion
pub async fn crawl_foodb(pipeline: &Pipeline) -> Result<()> {
    let range = pipeline.config.foodb.start_page..=pipeline.config.foodb.end_page;
    info!("Crawling FooDB compound catalog, pages {range:?}");

    let semaphore = Semaphore::new(pipeline.config.crawl.concurrency);
    let mut ingested = 0usize;
    let mut failed = 0usize;

    for page in range {
        let url = format!("{}{}", pipeline.config.foodb.catalog_url, page);
        let ids = match pipeline.fetcher.fetch(&url).await {
            Ok(html) => extract_foodb_ids(&html),
            Err(e) => {
                warn!("FooDB listing page {page} failed: {e}");
                continue;
            }
        };
        if ids.is_empty() {
            warn!("FooDB listing page {page} yielded no compound ids");
            continue;
        }

        let outcomes = futures::future::join_all(ids.iter().map(|id| {
            let semaphore = &semaphore;
            async move {
                // Semaphore is never closed, so acquisition cannot fail
                let _permit = semaphore.acquire().await;
                pipeline.ingest_foodb_id(id).await.map(|_| ())
            }
        }))
        .await;

        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Ok(()) => ingested += 1,
                Err(e) => {
                    failed += 1;
                    error!("FooDB {id}: {e}");
                }
            }
        }
    }

    info!("FooDB crawl finished: {ingested} compounds ingested, {failed} failed");
    pipeline.store.mark_crawl_complete("foodb").await
}

/// Crawl the HMDB metabolite catalog and record completion.
///
/// Requires a recorded FooDB completion in the store.
pub async fn crawl_hmdb(pipeline: &Pipeline) -> Result<()> {
    if !pipeline.store.crawl_completed("foodb").await? {
        return Err(Error::CrawlOrder(
            "HMDB reconciliation requires a completed FooDB crawl".to_string(),
        ));
    }

    let range = pipeline.config.hmdb.start_page..=pipeline.config.hmdb.end_page;
    info!("Crawling HMDB metabolite catalog, pages {range:?}");

    let semaphore = Semaphore::new(pipeline.config.crawl.concurrency);
    let mut ingested = 0usize;
    let mut failed = 0usize;

    for page in range {
        let url = format!("{}{}", pipeline.config.hmdb.catalog_url, page);
        let ids = match pipeline.fetcher.fetch(&url).await {
            Ok(html) => extract_hmdb_ids(&html),
            Err(e) => {
                warn!("HMDB listing page {page} failed: {e}");
                continue;
            }
        };
        if ids.is_empty() {
            warn!("HMDB listing page {page} yielded no metabolite ids");
            continue;
        }

        let outcomes = futures::future::join_all(ids.iter().map(|id| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await;
                pipeline.ingest_hmdb_id(id).await
            }
        }))
        .await;

        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Ok(()) => ingested += 1,
                Err(e) => {
                    failed += 1;
                    error!("HMDB {id}: {e}");
                }
            }
        }
    }

    info!("HMDB crawl finished: {ingested} metabolites reconciled, {failed} failed");
    pipeline.store.mark_crawl_complete("hmdb").await
}

/// Crawl the FooDB food listing, snapshot the category -> foods map as JSON
/// and upsert every food under its category.
///
/// Upserts make the import idempotent; re-running refreshes nothing but
/// fills in whatever is missing.
pub async fn import_food_catalog(pipeline: &Pipeline) -> Result<()> {
    info!(
        "Importing FooDB food catalog, {} pages",
        pipeline.config.foods.pages
    );

    let mut catalog: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for page in 1..=pipeline.config.foods.pages {
        let url = format!("{}{}", pipeline.config.foods.catalog_url, page);
        let html = match pipeline.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Food listing page {page} failed: {e}");
                continue;
            }
        };
        for (category, foods) in extract_food_catalog(&html) {
            catalog.entry(category).or_default().extend(foods);
        }
    }

    if catalog.is_empty() {
        return Err(Error::Crawl(
            "food catalog import yielded no foods".to_string(),
        ));
    }

    let snapshot = &pipeline.config.foods.snapshot_path;
    if let Some(parent) = snapshot.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(snapshot, serde_json::to_vec_pretty(&catalog)?)?;
    debug!("Food catalog snapshot written to {}", snapshot.display());

    let mut imported = 0usize;
    for (category, foods) in &catalog {
        let category_id = pipeline
            .cache
            .resolve_category(&pipeline.store, category)
            .await?;
        for food in foods {
            let id = pipeline.store.upsert_food(category_id, food).await?;
            pipeline.cache.put_food(food, id).await;
            imported += 1;
        }
    }

    info!(
        "Food catalog import finished: {imported} foods across {} categories",
        catalog.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoCache;
    use crate::config::Config;
    use crate::store::Store;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_pipeline(config: Config) -> (Pipeline, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::connect(&tmp.path().join("test.db")).await.unwrap();
        let cache = MemoCache::new();
        cache.load(&store).await.unwrap();
        let fetcher = Fetcher::new(&config.crawl).unwrap();
        (Pipeline::new(config, fetcher, store, cache), tmp)
    }

    fn foodb_listing(ids: &[&str]) -> String {
        let rows: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<tr><td><a class="btn-show" href="/compounds/{id}">{id}</a></td></tr>"#
                )
            })
            .collect();
        format!("<html><body><table>{rows}</table></body></html>")
    }

    fn foodb_detail(name: &str) -> String {
        format!(
            "<compound><name>{name}</name><class>Sugars</class>\
             <foods><food><name>Apple</name>\
             <average_value>1.0</average_value></food></foods></compound>"
        )
    }

    #[tokio::test]
    async fn test_crawl_foodb_ingests_listed_compounds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compounds"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(foodb_listing(&["FDB00001", "FDB00002"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compounds/FDB00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(foodb_detail("Glucose")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compounds/FDB00002"))
            .respond_with(ResponseTemplate::new(200).set_body_string(foodb_detail("Fructose")))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.foodb.catalog_url = format!("{}/compounds?page=", server.uri());
        config.foodb.detail_url = format!("{}/compounds/", server.uri());
        config.foodb.start_page = 1;
        config.foodb.end_page = 1;
        let (pipeline, _tmp) = setup_pipeline(config).await;

        crawl_foodb(&pipeline).await.unwrap();

        assert!(pipeline
            .store
            .find_compound_by_name("Glucose")
            .await
            .unwrap()
            .is_some());
        assert!(pipeline
            .store
            .find_compound_by_name("Fructose")
            .await
            .unwrap()
            .is_some());
        assert!(pipeline.store.crawl_completed("foodb").await.unwrap());
    }

    #[tokio::test]
    async fn test_crawl_foodb_skips_failed_entities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compounds"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(foodb_listing(&["FDB00001", "FDB00404"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compounds/FDB00001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(foodb_detail("Glucose")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compounds/FDB00404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.foodb.catalog_url = format!("{}/compounds?page=", server.uri());
        config.foodb.detail_url = format!("{}/compounds/", server.uri());
        config.foodb.start_page = 1;
        config.foodb.end_page = 1;
        let (pipeline, _tmp) = setup_pipeline(config).await;

        // One failing detail page does not abort the crawl
        crawl_foodb(&pipeline).await.unwrap();
        assert!(pipeline
            .store
            .find_compound_by_name("Glucose")
            .await
            .unwrap()
            .is_some());
        assert!(pipeline.store.crawl_completed("foodb").await.unwrap());
    }

    #[tokio::test]
    async fn test_crawl_hmdb_requires_foodb_completion() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;
        let err = crawl_hmdb(&pipeline).await.unwrap_err();
        assert!(matches!(err, Error::CrawlOrder(_)));
    }

    #[tokio::test]
    async fn test_crawl_hmdb_reconciles_after_foodb() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metabolites"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><table><tr>
                   <td class="metabolite-link"><a href="/metabolites/HMDB0000122">HMDB0000122</a></td>
                   </tr></table></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/metabolites/HMDB0000122.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<metabolite><name>Glucose</name>\
                 <foodb_id>FDB00001</foodb_id>\
                 <biospecimen_locations><biospecimen>Blood</biospecimen></biospecimen_locations>\
                 <normal_concentrations><concentration>\
                 <biospecimen>Blood</biospecimen>\
                 <concentration_value>3.9</concentration_value>\
                 <concentration_units>uM</concentration_units>\
                 </concentration></normal_concentrations></metabolite>",
            ))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.hmdb.catalog_url = format!("{}/metabolites?page=", server.uri());
        config.hmdb.detail_url = format!("{}/metabolites/", server.uri());
        config.hmdb.start_page = 1;
        config.hmdb.end_page = 1;
        let (pipeline, _tmp) = setup_pipeline(config).await;

        let record = crate::parse::FoodbRecord {
            name: Some("Glucose".to_string()),
            class: None,
            foods: Default::default(),
            anomalies: Vec::new(),
        };
        pipeline.ingest_foodb("FDB00001", &record).await.unwrap();
        pipeline.store.mark_crawl_complete("foodb").await.unwrap();

        crawl_hmdb(&pipeline).await.unwrap();

        let hmdb_id: Option<String> =
            sqlx::query_scalar("SELECT hmdb_id FROM compound WHERE name = 'Glucose'")
                .fetch_one(pipeline.store.pool())
                .await
                .unwrap();
        assert_eq!(hmdb_id.as_deref(), Some("HMDB0000122"));
        assert!(pipeline.store.crawl_completed("hmdb").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_food_catalog_snapshots_and_upserts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/foods"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><table>
                   <tr><td>1</td><td>Angelica</td><td>sci</td><td>pic</td>
                       <td>Herbs and Spices</td>
                       <td><a class="btn-show" href="/foods/1">show</a></td></tr>
                   <tr><td>2</td><td>Kale</td><td>sci</td><td>pic</td>
                       <td>Vegetables</td>
                       <td><a class="btn-show" href="/foods/2">show</a></td></tr>
                   </table></body></html>"#,
            ))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.foods.catalog_url = format!("{}/foods?page=", server.uri());
        config.foods.pages = 1;
        config.foods.snapshot_path = tmp.path().join("cache/food_map.json");
        let (pipeline, _db_tmp) = setup_pipeline(config).await;

        import_food_catalog(&pipeline).await.unwrap();

        assert!(pipeline
            .store
            .find_food_by_name("Kale")
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            pipeline.cache.food("Angelica").await,
            pipeline.store.find_food_by_name("Angelica").await.unwrap()
        );

        let snapshot: BTreeMap<String, Vec<String>> = serde_json::from_slice(
            &std::fs::read(&pipeline.config.foods.snapshot_path).unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot["Vegetables"], vec!["Kale"]);

        // Re-running is idempotent
        import_food_catalog(&pipeline).await.unwrap();
        assert_eq!(
            pipeline.store.load_foods().await.unwrap().len(),
            2 // Angelica and Kale, no duplicates
        );
    }
}
