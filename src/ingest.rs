//! Cross-source reconciliation engine
//!
//! Decides, per entity, whether to insert-as-new, link-to-existing, or
//! flag-and-skip. FooDB records insert fresh compound rows (a duplicate
//! natural key is a hard error); HMDB records resolve their FooDB identity
//! by exact name match, then by the embedded cross-reference id, falling
//! back to stub-ingesting the FooDB entity on demand. A name match whose
//! stored FooDB id disagrees with the embedded one is an unresolved
//! identity conflict and nothing is persisted for that record.

use crate::cache::MemoCache;
use crate::config::Config;
use crate::crawl::Fetcher;
use crate::error::{Error, Result};
use crate::parse::{
    log_anomalies, parse_foodb_document, parse_hmdb_document, ConcentrationRow, FoodbRecord,
    HmdbRecord,
};
use crate::store::{Store, UNKNOWN_CATEGORY};
use tracing::{error, info, warn};

/// Everything one entity ingestion needs: the fetcher, the store and the
/// shared memo caches. Constructed once per run and shared across tasks.
pub struct Pipeline {
    pub config: Config,
    pub fetcher: Fetcher,
    pub store: Store,
    pub cache: MemoCache,
}

impl Pipeline {
    pub fn new(config: Config, fetcher: Fetcher, store: Store, cache: MemoCache) -> Self {
        Self {
            config,
            fetcher,
            store,
            cache,
        }
    }

    /// Fetch, parse and ingest one FooDB compound by id.
    ///
    /// Also the stub-ingestion entry point: HMDB reconciliation calls back
    /// into this for compounds its catalog references but the FooDB crawl
    /// never produced.
    pub async fn ingest_foodb_id(&self, id: &str) -> Result<i64> {
        info!("Parsing FooDB compound {id}");
        let url = format!("{}{}", self.config.foodb.detail_url, id);
        let text = self.fetcher.fetch(&url).await?;
        let record = parse_foodb_document(&text)?;
        log_anomalies("FooDB", id, &record.anomalies);
        self.ingest_foodb(id, &record).await
    }

    /// Fetch, parse and ingest one HMDB metabolite by id
    pub async fn ingest_hmdb_id(&self, id: &str) -> Result<()> {
        info!("Parsing HMDB metabolite {id}");
        let url = format!("{}{}.xml", self.config.hmdb.detail_url, id);
        let text = self.fetcher.fetch(&url).await?;
        let record = parse_hmdb_document(&text)?;
        log_anomalies("HMDB", id, &record.anomalies);
        self.ingest_hmdb(id, &record).await
    }

    /// Persist one parsed FooDB record, returning the new compound id.
    ///
    /// The compound insert and its food links form one transaction; food
    /// and class rows are resolved on auto-commit connections first so the
    /// memo caches never hold an id a rollback would remove.
    pub async fn ingest_foodb(&self, foodb_id: &str, record: &FoodbRecord) -> Result<i64> {
        let name = record
            .name
            .as_deref()
            .ok_or_else(|| Error::Parse(format!("{foodb_id}: compound has no name")))?;

        let class_id = match record.class.as_deref() {
            Some(class) => Some(self.cache.resolve_class(&self.store, class).await?),
            None => None,
        };

        let mut links = Vec::with_capacity(record.foods.len());
        for (food, values) in &record.foods {
            links.push((self.resolve_food(food).await?, values));
        }

        let mut tx = self.store.begin().await?;
        let compound_id = self
            .store
            .insert_compound(&mut tx, name, class_id, Some(foodb_id), None)
            .await?;
        for (food_id, values) in links {
            self.store
                .insert_food_compound(&mut tx, compound_id, food_id, values)
                .await?;
        }
        tx.commit().await?;
        Ok(compound_id)
    }

    /// Persist one parsed HMDB record against the already-ingested FooDB
    /// catalog
    pub async fn ingest_hmdb(&self, hmdb_id: &str, record: &HmdbRecord) -> Result<()> {
        let name = record
            .name
            .as_deref()
            .ok_or_else(|| Error::Parse(format!("{hmdb_id}: metabolite has no name")))?;

        let existing = self.store.find_compound_by_name(name).await?;
        let mut compound_id = existing.as_ref().map(|(id, _)| *id);
        let stored_foodb_id = existing.and_then(|(_, foodb_id)| foodb_id);

        if let Some(parsed) = record.foodb_id.as_deref() {
            match compound_id {
                None => {
                    info!("{hmdb_id}: no compound named {name:?}; using embedded FooDB id {parsed}");
                    compound_id = self.store.find_compound_by_foodb_id(parsed).await?;
                    if compound_id.is_none() {
                        compound_id = Some(self.ingest_foodb_id(parsed).await?);
                    }
                }
                Some(_) if stored_foodb_id.as_deref() != Some(parsed) => {
                    return Err(Error::IdentityConflict {
                        hmdb_id: hmdb_id.to_string(),
                        name: name.to_string(),
                        stored: stored_foodb_id,
                        parsed: parsed.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        let compound_id = match compound_id {
            Some(id) => {
                self.store.set_hmdb_id(id, hmdb_id).await?;
                id
            }
            None => {
                warn!("{hmdb_id}: no FooDB id; creating compound with the HMDB key only");
                let mut conn = self.store.acquire().await?;
                self.store
                    .insert_compound(&mut conn, name, None, None, Some(hmdb_id))
                    .await?
            }
        };

        if record.biospecimens.is_empty() {
            warn!("{hmdb_id}: no biospecimens");
        }
        for biospecimen in &record.biospecimens {
            // A failed link leaves the compound row intact
            if let Err(e) = self.link_biospecimen(compound_id, biospecimen).await {
                error!("{hmdb_id}: failed to link biospecimen {biospecimen}: {e}");
            }
        }

        for (label, rows) in [("normal", &record.normal), ("abnormal", &record.abnormal)] {
            if rows.is_empty() {
                info!("{hmdb_id}: no {label} concentrations");
                continue;
            }
            for row in rows.iter() {
                if let Err(e) = self.persist_concentration(compound_id, row).await {
                    warn!("{hmdb_id}: dropped {label} concentration row: {e}");
                }
            }
        }
        Ok(())
    }

    /// Resolve a food name to an id: memo cache, then store lookup, then
    /// creation under the sentinel category. A created food means the
    /// catalog-wide food listing import was incomplete or stale.
    pub(crate) async fn resolve_food(&self, name: &str) -> Result<i64> {
        if let Some(id) = self.cache.food(name).await {
            return Ok(id);
        }
        if let Some(id) = self.store.find_food_by_name(name).await? {
            self.cache.put_food(name, id).await;
            return Ok(id);
        }
        let unknown = self
            .cache
            .resolve_category(&self.store, UNKNOWN_CATEGORY)
            .await?;
        let id = self.store.upsert_food(unknown, name).await?;
        warn!("Food {name:?} does not exist in the catalog; created with category {UNKNOWN_CATEGORY}");
        self.cache.put_food(name, id).await;
        Ok(id)
    }

    async fn link_biospecimen(&self, compound_id: i64, name: &str) -> Result<()> {
        let biospecimen_id = self.cache.resolve_biospecimen(&self.store, name).await?;
        self.store
            .insert_compound_biospecimen(compound_id, biospecimen_id)
            .await
    }

    /// Insert one concentration row and its references as a unit. The
    /// biospecimen must already be cached by the linking step.
    async fn persist_concentration(
        &self,
        compound_id: i64,
        row: &ConcentrationRow,
    ) -> Result<()> {
        let biospecimen = row
            .biospecimen
            .as_deref()
            .ok_or_else(|| Error::Parse("row has no biospecimen".to_string()))?;
        let biospecimen_id = self
            .cache
            .biospecimen(biospecimen)
            .await
            .ok_or_else(|| Error::Parse(format!("biospecimen {biospecimen:?} is not linked")))?;
        let units = row
            .units
            .as_deref()
            .ok_or_else(|| Error::Parse("row has no units".to_string()))?;

        let mut tx = self.store.begin().await?;
        let concentration_id = self
            .store
            .insert_concentration(&mut tx, compound_id, biospecimen_id, units, row)
            .await?;
        for reference in &row.references {
            self.store
                .insert_reference(&mut tx, concentration_id, reference)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{FoodValues, ReferenceRow};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_pipeline(config: Config) -> (Arc<Pipeline>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::connect(&tmp.path().join("test.db")).await.unwrap();
        let cache = MemoCache::new();
        cache.load(&store).await.unwrap();
        let fetcher = Fetcher::new(&config.crawl).unwrap();
        (Arc::new(Pipeline::new(config, fetcher, store, cache)), tmp)
    }

    fn glucose_record() -> FoodbRecord {
        let mut foods = BTreeMap::new();
        foods.insert(
            "Apple".to_string(),
            FoodValues {
                average: Some(3.5),
                max: Some(5.0),
                min: Some(1.0),
            },
        );
        FoodbRecord {
            name: Some("Glucose".to_string()),
            class: Some("Sugars".to_string()),
            foods,
            anomalies: Vec::new(),
        }
    }

    fn hmdb_record(name: &str, foodb_id: Option<&str>) -> HmdbRecord {
        HmdbRecord {
            name: Some(name.to_string()),
            foodb_id: foodb_id.map(str::to_string),
            biospecimens: vec!["Blood".to_string()],
            normal: vec![ConcentrationRow {
                biospecimen: Some("Blood".to_string()),
                value: "3.9".to_string(),
                units: Some("uM".to_string()),
                age: Some("Adult".to_string()),
                references: vec![ReferenceRow {
                    reference_text: Some("Smith 1999".to_string()),
                    pubmed_id: Some("10234567".to_string()),
                }],
                ..Default::default()
            }],
            abnormal: Vec::new(),
            anomalies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_foodb_end_to_end() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        let compound_id = pipeline
            .ingest_foodb("FDB00001", &glucose_record())
            .await
            .unwrap();

        let (found, foodb_id) = pipeline
            .store
            .find_compound_by_name("Glucose")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, compound_id);
        assert_eq!(foodb_id.as_deref(), Some("FDB00001"));

        let classes = pipeline.store.load_classes().await.unwrap();
        assert!(classes.iter().any(|(_, name)| name == "Sugars"));

        let food_id = pipeline
            .store
            .find_food_by_name("Apple")
            .await
            .unwrap()
            .unwrap();
        let link: (f64, f64, f64) = sqlx::query_as(
            "SELECT average_value, max_value, min_value FROM food_compounds \
             WHERE compound_id = ? AND food_id = ?",
        )
        .bind(compound_id)
        .bind(food_id)
        .fetch_one(pipeline.store.pool())
        .await
        .unwrap();
        assert_eq!(link, (3.5, 5.0, 1.0));
    }

    #[tokio::test]
    async fn test_duplicate_foodb_ingestion_fails() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        pipeline
            .ingest_foodb("FDB00001", &glucose_record())
            .await
            .unwrap();
        let err = pipeline
            .ingest_foodb("FDB00001", &glucose_record())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCompound { .. }));

        // The food-link half of the unit rolled back with it
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM food_compounds")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(links, 1);
    }

    #[tokio::test]
    async fn test_hmdb_attaches_to_name_match() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        let compound_id = pipeline
            .ingest_foodb("FDB00123", &glucose_record())
            .await
            .unwrap();
        pipeline
            .ingest_hmdb("HMDB0000122", &hmdb_record("Glucose", Some("FDB00123")))
            .await
            .unwrap();

        // No new compound was created
        let compounds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM compound")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(compounds, 1);

        let hmdb_id: Option<String> =
            sqlx::query_scalar("SELECT hmdb_id FROM compound WHERE id = ?")
                .bind(compound_id)
                .fetch_one(pipeline.store.pool())
                .await
                .unwrap();
        assert_eq!(hmdb_id.as_deref(), Some("HMDB0000122"));

        let concentrations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concentration")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(concentrations, 1);
        let references: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reference")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(references, 1);
    }

    #[tokio::test]
    async fn test_hmdb_identity_conflict_rejects_record() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        let compound_id = pipeline
            .ingest_foodb("FDB00123", &glucose_record())
            .await
            .unwrap();
        let err = pipeline
            .ingest_hmdb("HMDB0000122", &hmdb_record("Glucose", Some("FDB00999")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));

        // Nothing was mutated or persisted for the rejected record
        let hmdb_id: Option<String> =
            sqlx::query_scalar("SELECT hmdb_id FROM compound WHERE id = ?")
                .bind(compound_id)
                .fetch_one(pipeline.store.pool())
                .await
                .unwrap();
        assert_eq!(hmdb_id, None);
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM compound_biospecimens")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(links, 0);
    }

    #[tokio::test]
    async fn test_hmdb_without_cross_reference_creates_minimal_compound() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        pipeline
            .ingest_hmdb("HMDB0000190", &hmdb_record("L-Lactic acid", None))
            .await
            .unwrap();

        let (_, foodb_id) = pipeline
            .store
            .find_compound_by_name("L-Lactic acid")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(foodb_id, None);
        let (hmdb_id, class_id): (Option<String>, Option<i64>) = sqlx::query_as(
            "SELECT hmdb_id, class_id FROM compound WHERE name = 'L-Lactic acid'",
        )
        .fetch_one(pipeline.store.pool())
        .await
        .unwrap();
        assert_eq!(hmdb_id.as_deref(), Some("HMDB0000190"));
        assert_eq!(class_id, None);
    }

    #[tokio::test]
    async fn test_hmdb_stub_ingests_missing_foodb_compound() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compounds/FDB00777"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<compound><name>Citric acid</name><class>Acids</class>\
                 <foods><food><name>Lemon</name>\
                 <average_value>2.0</average_value>\
                 <max_value>3.0</max_value>\
                 <min_value>1.0</min_value></food></foods></compound>",
            ))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.foodb.detail_url = format!("{}/compounds/", server.uri());
        let (pipeline, _tmp) = setup_pipeline(config).await;

        pipeline
            .ingest_hmdb("HMDB0000094", &hmdb_record("Citric acid", Some("FDB00777")))
            .await
            .unwrap();

        let (compound_id, foodb_id) = pipeline
            .store
            .find_compound_by_name("Citric acid")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(foodb_id.as_deref(), Some("FDB00777"));
        let hmdb_id: Option<String> =
            sqlx::query_scalar("SELECT hmdb_id FROM compound WHERE id = ?")
                .bind(compound_id)
                .fetch_one(pipeline.store.pool())
                .await
                .unwrap();
        assert_eq!(hmdb_id.as_deref(), Some("HMDB0000094"));

        // The stub brought its food associations along
        assert!(pipeline
            .store
            .find_food_by_name("Lemon")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_concentration_with_unlinked_biospecimen_is_dropped() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        let mut record = hmdb_record("Glucose", None);
        record.normal.push(ConcentrationRow {
            biospecimen: Some("Cerebrospinal Fluid".to_string()),
            value: "0.2".to_string(),
            units: Some("uM".to_string()),
            ..Default::default()
        });
        pipeline.ingest_hmdb("HMDB0000122", &record).await.unwrap();

        // Blood row persisted, the unlinked one did not
        let concentrations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concentration")
            .fetch_one(pipeline.store.pool())
            .await
            .unwrap();
        assert_eq!(concentrations, 1);
    }

    #[tokio::test]
    async fn test_concurrent_food_resolution_round_trip() {
        let (pipeline, _tmp) = setup_pipeline(Config::default()).await;

        let names: Vec<String> = (0..16).map(|i| format!("Food {i}")).collect();
        let ids = futures::future::try_join_all(
            names.iter().map(|name| pipeline.resolve_food(name)),
        )
        .await
        .unwrap();

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), names.len());

        assert_eq!(pipeline.store.load_foods().await.unwrap().len(), names.len());
        for (name, id) in names.iter().zip(ids) {
            assert_eq!(pipeline.cache.food(name).await, Some(id));
        }
    }
}
