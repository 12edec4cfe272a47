//! SQLite-backed pattern persistence.
//!
//! Patterns are scoped to a case and keyed by the signature hash: the first
//! observation of a hash creates the pattern, later observations update it
//! under a monotonic quality gate. Divergences are an append-only audit
//! trail and are recorded independently of that gate.

use std::path::Path;
use std::sync::Mutex;

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::geometry::BBox;
use crate::store::models::{
    Case, Divergence, EngineStats, Observation, ObservedPattern, PatternHint, PatternType,
    SignatureVector,
};

/// Cosine similarity between two feature vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs, so a
/// degenerate signature can never match anything.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Per-case store of learned extraction patterns.
///
/// All access goes through one serialized connection; the store is safe to
/// share behind an `Arc` across worker threads.
pub struct PatternStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl PatternStore {
    /// Open (creating if necessary) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] when the database cannot be opened or the
    /// schema cannot be initialized.
    ///
    /// [`Error::Store`]: crate::error::Error::Store
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init_schema(&conn)?;
        info!("Pattern store opened at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open an in-memory store. Contents vanish on drop.
    pub fn open_in_memory(config: StoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cases (
                id            INTEGER PRIMARY KEY,
                case_ref      TEXT NOT NULL UNIQUE,
                origin_system TEXT NOT NULL,
                created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS observed_patterns (
                id                   INTEGER PRIMARY KEY,
                case_id              INTEGER NOT NULL REFERENCES cases(id),
                pattern_type         TEXT NOT NULL,
                signature_hash       TEXT NOT NULL,
                signature_vector     TEXT NOT NULL,
                first_seen_page      INTEGER NOT NULL,
                last_seen_page       INTEGER NOT NULL,
                created_by_engine    TEXT NOT NULL,
                engine_quality_score REAL NOT NULL,
                occurrence_count     INTEGER NOT NULL DEFAULT 1,
                avg_confidence       REAL NOT NULL,
                divergence_count     INTEGER NOT NULL DEFAULT 0,
                deprecated           INTEGER NOT NULL DEFAULT 0,
                suggested_bbox       TEXT,
                suggested_engine     TEXT,
                created_at           TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at           TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (case_id, signature_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_patterns_case
                ON observed_patterns (case_id, deprecated);

            CREATE TABLE IF NOT EXISTS divergences (
                id                  INTEGER PRIMARY KEY,
                pattern_id          INTEGER NOT NULL REFERENCES observed_patterns(id),
                page_num            INTEGER NOT NULL,
                expected_confidence REAL NOT NULL,
                actual_confidence   REAL NOT NULL,
                engine_used         TEXT NOT NULL,
                recorded_at         TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_divergences_pattern
                ON divergences (pattern_id);",
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a case by reference, creating it on first use.
    ///
    /// Idempotent: repeated calls with the same reference return the same
    /// row and never duplicate it.
    pub fn get_or_create_case(&self, case_ref: &str, origin_system: &str) -> Result<Case> {
        let conn = self.lock();

        let existing = conn
            .query_row(
                "SELECT id, case_ref, origin_system FROM cases WHERE case_ref = ?1",
                params![case_ref],
                |row| {
                    Ok(Case {
                        id: row.get(0)?,
                        case_ref: row.get(1)?,
                        origin_system: row.get(2)?,
                    })
                },
            )
            .optional()?;

        if let Some(case) = existing {
            return Ok(case);
        }

        conn.execute(
            "INSERT INTO cases (case_ref, origin_system) VALUES (?1, ?2)",
            params![case_ref, origin_system],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created case {case_ref} ({origin_system}) as #{id}");

        Ok(Case {
            id,
            case_ref: case_ref.to_string(),
            origin_system: origin_system.to_string(),
        })
    }

    /// Find the stored pattern most similar to a signature, within one case.
    ///
    /// Deprecated patterns are skipped. Returns `None` when no candidate
    /// reaches the configured similarity threshold; ties keep the first
    /// maximum in id order. A returned hint is a suggestion only, never a
    /// directive.
    pub fn find_similar_pattern(
        &self,
        case_id: i64,
        signature: &SignatureVector,
        pattern_type: Option<PatternType>,
    ) -> Result<Option<PatternHint>> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT id, pattern_type, signature_vector, created_by_engine,
                    occurrence_count, avg_confidence, suggested_bbox, suggested_engine
             FROM observed_patterns
             WHERE case_id = ?1 AND deprecated = 0
             ORDER BY id",
        )?;

        let mut rows = stmt.query(params![case_id])?;
        let mut best: Option<PatternHint> = None;

        while let Some(row) = rows.next()? {
            let row_type = PatternType::from_str_lossy(&row.get::<_, String>(1)?);
            if let Some(wanted) = pattern_type {
                if row_type != wanted {
                    continue;
                }
            }

            let vector_json: String = row.get(2)?;
            let vector: Vec<f64> = serde_json::from_str(&vector_json).unwrap_or_default();
            let similarity = cosine_similarity(signature.features(), &vector);
            if similarity < self.config.similarity_threshold {
                continue;
            }
            if best.as_ref().is_some_and(|b| similarity <= b.similarity) {
                continue;
            }

            let bbox_json: Option<String> = row.get(6)?;
            let suggested_bbox = bbox_json
                .as_deref()
                .and_then(|json| serde_json::from_str::<BBox>(json).ok());

            best = Some(PatternHint {
                pattern_id: row.get(0)?,
                similarity,
                suggested_bbox,
                suggested_engine: row.get(7)?,
                confidence: row.get(5)?,
                created_by_engine: row.get(3)?,
                pattern_type: row_type,
                occurrence_count: row.get(4)?,
            });
        }

        if let Some(ref hint) = best {
            debug!(
                "Pattern #{} matched with similarity {:.3} for case #{case_id}",
                hint.pattern_id, hint.similarity
            );
        }
        Ok(best)
    }

    /// Record one page observation, creating or updating the pattern keyed
    /// by the signature hash.
    ///
    /// An existing pattern is updated only when the observing engine's
    /// quality is at least the stored creator quality; lower-quality
    /// observations are skipped, keeping `avg_confidence` monotonic in
    /// source quality. An accepted observation that supplies a bbox replaces
    /// the stored one; without a bbox the stored one is kept.
    ///
    /// Independently of that gate, when a hint was used and the actual
    /// confidence differs from the hint's expectation by more than the
    /// configured threshold, a divergence row is appended against the
    /// hinted pattern. Everything happens in one transaction.
    ///
    /// Returns the id of the pattern for this signature.
    pub fn learn_from_page(
        &self,
        case_id: i64,
        signature: &SignatureVector,
        observation: &Observation,
        hint: Option<&PatternHint>,
    ) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, engine_quality_score FROM observed_patterns
                 WHERE case_id = ?1 AND signature_hash = ?2",
                params![case_id, signature.hash()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
            )
            .optional()?;

        let bbox_json = observation
            .bbox
            .as_ref()
            .map(|bbox| serde_json::to_string(bbox).expect("bbox serializes"));

        let pattern_id = match existing {
            None => {
                tx.execute(
                    "INSERT INTO observed_patterns
                        (case_id, pattern_type, signature_hash, signature_vector,
                         first_seen_page, last_seen_page, created_by_engine,
                         engine_quality_score, occurrence_count, avg_confidence,
                         suggested_bbox, suggested_engine)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, 1, ?8, ?9, ?10)",
                    params![
                        case_id,
                        observation.pattern_type.as_str(),
                        signature.hash(),
                        serde_json::to_string(signature.features())
                            .expect("feature vector serializes"),
                        observation.page_num as i64,
                        observation.engine,
                        observation.engine_quality,
                        observation.confidence,
                        bbox_json,
                        observation.engine,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                debug!(
                    "Learned new pattern #{id} from {} on page {}",
                    observation.engine, observation.page_num
                );
                id
            }
            Some((id, stored_quality)) => {
                if observation.engine_quality >= stored_quality {
                    // Running mean over occurrence_count accepted observations.
                    tx.execute(
                        "UPDATE observed_patterns SET
                            last_seen_page = ?2,
                            avg_confidence =
                                (avg_confidence * occurrence_count + ?3)
                                / (occurrence_count + 1),
                            occurrence_count = occurrence_count + 1,
                            suggested_bbox = COALESCE(?4, suggested_bbox),
                            updated_at = CURRENT_TIMESTAMP
                         WHERE id = ?1",
                        params![
                            id,
                            observation.page_num as i64,
                            observation.confidence,
                            bbox_json,
                        ],
                    )?;
                } else {
                    debug!(
                        "Skipping update of pattern #{id}: {} quality {:.2} below stored {:.2}",
                        observation.engine, observation.engine_quality, stored_quality
                    );
                }
                id
            }
        };

        if let Some(hint) = hint {
            let gap = (hint.confidence - observation.confidence).abs();
            if gap > self.config.divergence_threshold {
                tx.execute(
                    "INSERT INTO divergences
                        (pattern_id, page_num, expected_confidence,
                         actual_confidence, engine_used)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        hint.pattern_id,
                        observation.page_num as i64,
                        hint.confidence,
                        observation.confidence,
                        observation.engine,
                    ],
                )?;
                tx.execute(
                    "UPDATE observed_patterns
                     SET divergence_count = divergence_count + 1,
                         updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?1",
                    params![hint.pattern_id],
                )?;
                info!(
                    "Divergence of {gap:.2} recorded against pattern #{} on page {}",
                    hint.pattern_id, observation.page_num
                );
            }
        }

        tx.commit()?;
        Ok(pattern_id)
    }

    /// Fetch one pattern by id.
    pub fn pattern(&self, pattern_id: i64) -> Result<Option<ObservedPattern>> {
        let conn = self.lock();
        let pattern = conn
            .query_row(
                "SELECT id, case_id, pattern_type, signature_hash, signature_vector,
                        first_seen_page, last_seen_page, created_by_engine,
                        engine_quality_score, occurrence_count, avg_confidence,
                        divergence_count, deprecated, suggested_bbox, suggested_engine
                 FROM observed_patterns WHERE id = ?1",
                params![pattern_id],
                |row| {
                    let vector_json: String = row.get(4)?;
                    let bbox_json: Option<String> = row.get(13)?;
                    Ok(ObservedPattern {
                        id: row.get(0)?,
                        case_id: row.get(1)?,
                        pattern_type: PatternType::from_str_lossy(&row.get::<_, String>(2)?),
                        signature_hash: row.get(3)?,
                        signature_vector: serde_json::from_str(&vector_json).unwrap_or_default(),
                        first_seen_page: row.get::<_, i64>(5)? as usize,
                        last_seen_page: row.get::<_, i64>(6)? as usize,
                        created_by_engine: row.get(7)?,
                        engine_quality_score: row.get(8)?,
                        occurrence_count: row.get(9)?,
                        avg_confidence: row.get(10)?,
                        divergence_count: row.get(11)?,
                        deprecated: row.get::<_, i64>(12)? != 0,
                        suggested_bbox: bbox_json
                            .as_deref()
                            .and_then(|json| serde_json::from_str(json).ok()),
                        suggested_engine: row.get(14)?,
                    })
                },
            )
            .optional()?;
        Ok(pattern)
    }

    /// Number of patterns in a case, optionally including deprecated ones.
    pub fn pattern_count(&self, case_id: i64, include_deprecated: bool) -> Result<u32> {
        let conn = self.lock();
        let count = if include_deprecated {
            conn.query_row(
                "SELECT COUNT(*) FROM observed_patterns WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )?
        } else {
            conn.query_row(
                "SELECT COUNT(*) FROM observed_patterns
                 WHERE case_id = ?1 AND deprecated = 0",
                params![case_id],
                |row| row.get(0),
            )?
        };
        Ok(count)
    }

    /// Mark a pattern as deprecated, removing it from future lookups.
    ///
    /// Deprecation is always an explicit call; the store never deprecates
    /// a pattern on its own, whatever its divergence count.
    pub fn deprecate_pattern(&self, pattern_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE observed_patterns
             SET deprecated = 1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![pattern_id],
        )?;
        info!("Pattern #{pattern_id} deprecated");
        Ok(())
    }

    /// Divergences recorded against a pattern, oldest first.
    pub fn divergences(&self, pattern_id: i64) -> Result<Vec<Divergence>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, pattern_id, page_num, expected_confidence,
                    actual_confidence, engine_used
             FROM divergences WHERE pattern_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![pattern_id], |row| {
            Ok(Divergence {
                id: row.get(0)?,
                pattern_id: row.get(1)?,
                page_num: row.get::<_, i64>(2)? as usize,
                expected_confidence: row.get(3)?,
                actual_confidence: row.get(4)?,
                engine_used: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Per-engine aggregates across every case in the store.
    pub fn engine_stats(&self) -> Result<Vec<EngineStats>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT created_by_engine,
                    COUNT(*),
                    AVG(avg_confidence),
                    SUM(occurrence_count),
                    SUM(deprecated)
             FROM observed_patterns
             GROUP BY created_by_engine
             ORDER BY created_by_engine",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EngineStats {
                engine: row.get(0)?,
                total_patterns: row.get(1)?,
                avg_confidence: row.get(2)?,
                total_occurrences: row.get::<_, i64>(3)? as u64,
                deprecated_count: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> PatternStore {
        PatternStore::open_in_memory(StoreConfig::default()).unwrap()
    }

    fn signature(features: &[f64]) -> SignatureVector {
        SignatureVector::new(features.to_vec()).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patterns.db");
        let store = PatternStore::open(&path, StoreConfig::default()).unwrap();
        store.get_or_create_case("0001234-56.2024.8.26.0100", "esaj").unwrap();
        drop(store);
        assert!(path.exists());

        // Reopening sees the persisted case.
        let reopened = PatternStore::open(&path, StoreConfig::default()).unwrap();
        let case = reopened
            .get_or_create_case("0001234-56.2024.8.26.0100", "esaj")
            .unwrap();
        assert_eq!(case.origin_system, "esaj");
    }

    #[test]
    fn test_get_or_create_case_is_idempotent() {
        let store = store();
        let first = store.get_or_create_case("123-45", "pje").unwrap();
        let second = store.get_or_create_case("123-45", "pje").unwrap();
        assert_eq!(first, second);

        let other = store.get_or_create_case("678-90", "eproc").unwrap();
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn test_learn_then_find_round_trip() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.5, 0.25, 0.1, 0.8]);

        let obs = Observation::new(1, "marker", 1.0, 0.92)
            .with_text_length(1200)
            .with_pattern_type(PatternType::Header)
            .with_bbox(BBox::new(0.0, 0.0, 612.0, 80.0));
        let pattern_id = store.learn_from_page(case.id, &sig, &obs, None).unwrap();

        let hint = store
            .find_similar_pattern(case.id, &sig, None)
            .unwrap()
            .expect("identical signature should match");
        assert_eq!(hint.pattern_id, pattern_id);
        assert!((hint.similarity - 1.0).abs() < 1e-9);
        assert!((hint.confidence - 0.92).abs() < 1e-9);
        assert_eq!(hint.created_by_engine, "marker");
        assert_eq!(hint.pattern_type, PatternType::Header);
        assert_eq!(
            hint.suggested_bbox,
            Some(BBox::new(0.0, 0.0, 612.0, 80.0))
        );
        assert!(hint.should_use());
    }

    #[test]
    fn test_find_respects_similarity_threshold() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[1.0, 0.0, 0.0]);
        let obs = Observation::new(1, "marker", 1.0, 0.9);
        store.learn_from_page(case.id, &sig, &obs, None).unwrap();

        // Orthogonal query: similarity 0, well below 0.85.
        let query = signature(&[0.0, 1.0, 0.0]);
        assert!(store.find_similar_pattern(case.id, &query, None).unwrap().is_none());
    }

    #[test]
    fn test_find_filters_by_pattern_type() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.3, 0.7]);
        let obs = Observation::new(1, "marker", 1.0, 0.9).with_pattern_type(PatternType::Footer);
        store.learn_from_page(case.id, &sig, &obs, None).unwrap();

        assert!(store
            .find_similar_pattern(case.id, &sig, Some(PatternType::Footer))
            .unwrap()
            .is_some());
        assert!(store
            .find_similar_pattern(case.id, &sig, Some(PatternType::Table))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_is_scoped_to_case() {
        let store = store();
        let case_a = store.get_or_create_case("123-45", "pje").unwrap();
        let case_b = store.get_or_create_case("678-90", "pje").unwrap();
        let sig = signature(&[0.3, 0.7]);
        let obs = Observation::new(1, "marker", 1.0, 0.9);
        store.learn_from_page(case_a.id, &sig, &obs, None).unwrap();

        assert!(store.find_similar_pattern(case_a.id, &sig, None).unwrap().is_some());
        assert!(store.find_similar_pattern(case_b.id, &sig, None).unwrap().is_none());
    }

    #[test]
    fn test_update_recomputes_running_mean() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.1, 0.9]);

        let first = Observation::new(1, "marker", 1.0, 0.8);
        let id = store.learn_from_page(case.id, &sig, &first, None).unwrap();

        let second = Observation::new(4, "marker", 1.0, 1.0);
        let same_id = store.learn_from_page(case.id, &sig, &second, None).unwrap();
        assert_eq!(id, same_id);

        let pattern = store.pattern(id).unwrap().unwrap();
        assert_eq!(pattern.occurrence_count, 2);
        assert!((pattern.avg_confidence - 0.9).abs() < 1e-9);
        assert_eq!(pattern.first_seen_page, 1);
        assert_eq!(pattern.last_seen_page, 4);
    }

    #[test]
    fn test_lower_quality_observation_is_gated() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.1, 0.9]);

        let good = Observation::new(1, "marker", 1.0, 0.9);
        let id = store.learn_from_page(case.id, &sig, &good, None).unwrap();

        // Tesseract (quality 0.7) must not dilute a marker-created pattern.
        let worse = Observation::new(2, "tesseract", 0.7, 0.4);
        store.learn_from_page(case.id, &sig, &worse, None).unwrap();

        let pattern = store.pattern(id).unwrap().unwrap();
        assert_eq!(pattern.occurrence_count, 1);
        assert!((pattern.avg_confidence - 0.9).abs() < 1e-9);
        assert_eq!(pattern.last_seen_page, 1);
    }

    #[test]
    fn test_bbox_kept_when_update_supplies_none() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.2, 0.8]);

        let with_bbox = Observation::new(1, "marker", 1.0, 0.9)
            .with_bbox(BBox::new(10.0, 10.0, 500.0, 700.0));
        let id = store.learn_from_page(case.id, &sig, &with_bbox, None).unwrap();

        let without = Observation::new(2, "marker", 1.0, 0.9);
        store.learn_from_page(case.id, &sig, &without, None).unwrap();

        let pattern = store.pattern(id).unwrap().unwrap();
        assert_eq!(pattern.suggested_bbox, Some(BBox::new(10.0, 10.0, 500.0, 700.0)));
    }

    #[test]
    fn test_supplied_bbox_replaces_stored_one() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.2, 0.8]);

        let first = Observation::new(1, "marker", 1.0, 0.9)
            .with_bbox(BBox::new(0.0, 0.0, 100.0, 100.0));
        let id = store.learn_from_page(case.id, &sig, &first, None).unwrap();

        // Same-quality accepted update with a fresher region wins.
        let second = Observation::new(2, "marker", 1.0, 0.9)
            .with_bbox(BBox::new(50.0, 50.0, 200.0, 200.0));
        store.learn_from_page(case.id, &sig, &second, None).unwrap();

        let pattern = store.pattern(id).unwrap().unwrap();
        assert_eq!(
            pattern.suggested_bbox,
            Some(BBox::new(50.0, 50.0, 200.0, 200.0))
        );
    }

    #[test]
    fn test_divergence_recorded_even_when_update_gated() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.1, 0.9]);

        let good = Observation::new(1, "marker", 1.0, 0.95);
        let id = store.learn_from_page(case.id, &sig, &good, None).unwrap();
        let hint = store.find_similar_pattern(case.id, &sig, None).unwrap().unwrap();

        // Gated observation (lower quality) whose confidence misses the
        // hint's expectation by more than the 0.2 threshold.
        let worse = Observation::new(2, "tesseract", 0.7, 0.3);
        store.learn_from_page(case.id, &sig, &worse, Some(&hint)).unwrap();

        let pattern = store.pattern(id).unwrap().unwrap();
        assert_eq!(pattern.occurrence_count, 1, "update must stay gated");
        assert_eq!(pattern.divergence_count, 1);

        let divergences = store.divergences(id).unwrap();
        assert_eq!(divergences.len(), 1);
        assert_eq!(divergences[0].page_num, 2);
        assert_eq!(divergences[0].engine_used, "tesseract");
        assert!((divergences[0].magnitude() - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_small_gap_records_no_divergence() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.1, 0.9]);

        let obs = Observation::new(1, "marker", 1.0, 0.9);
        let id = store.learn_from_page(case.id, &sig, &obs, None).unwrap();
        let hint = store.find_similar_pattern(case.id, &sig, None).unwrap().unwrap();

        let close = Observation::new(2, "marker", 1.0, 0.8);
        store.learn_from_page(case.id, &sig, &close, Some(&hint)).unwrap();

        assert!(store.divergences(id).unwrap().is_empty());
        assert_eq!(store.pattern(id).unwrap().unwrap().divergence_count, 0);
    }

    #[test]
    fn test_divergence_attaches_to_hinted_pattern_on_create() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();

        let known = signature(&[1.0, 0.0]);
        let obs = Observation::new(1, "marker", 1.0, 0.95);
        let known_id = store.learn_from_page(case.id, &known, &obs, None).unwrap();
        let hint = store.find_similar_pattern(case.id, &known, None).unwrap().unwrap();

        // A new signature creates its own pattern, but the divergence still
        // lands on the pattern the hint came from.
        let novel = signature(&[0.0, 1.0]);
        let novel_obs = Observation::new(3, "tesseract", 0.7, 0.3);
        let novel_id = store
            .learn_from_page(case.id, &novel, &novel_obs, Some(&hint))
            .unwrap();
        assert_ne!(novel_id, known_id);

        assert_eq!(store.divergences(known_id).unwrap().len(), 1);
        assert!(store.divergences(novel_id).unwrap().is_empty());
    }

    #[test]
    fn test_deprecated_patterns_excluded_from_lookup() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();
        let sig = signature(&[0.4, 0.6]);
        let obs = Observation::new(1, "marker", 1.0, 0.9);
        let id = store.learn_from_page(case.id, &sig, &obs, None).unwrap();

        store.deprecate_pattern(id).unwrap();

        assert!(store.find_similar_pattern(case.id, &sig, None).unwrap().is_none());
        assert_eq!(store.pattern_count(case.id, false).unwrap(), 0);
        assert_eq!(store.pattern_count(case.id, true).unwrap(), 1);
    }

    #[test]
    fn test_engine_stats_aggregates() {
        let store = store();
        let case = store.get_or_create_case("123-45", "pje").unwrap();

        let marker_a = Observation::new(1, "marker", 1.0, 0.9);
        store.learn_from_page(case.id, &signature(&[1.0, 0.0]), &marker_a, None).unwrap();
        let marker_b = Observation::new(2, "marker", 1.0, 0.7);
        let b_id = store.learn_from_page(case.id, &signature(&[0.0, 1.0]), &marker_b, None).unwrap();
        let ocr = Observation::new(3, "tesseract", 0.7, 0.5);
        store.learn_from_page(case.id, &signature(&[0.5, 0.5]), &ocr, None).unwrap();

        store.deprecate_pattern(b_id).unwrap();

        let stats = store.engine_stats().unwrap();
        assert_eq!(stats.len(), 2);

        let marker = stats.iter().find(|s| s.engine == "marker").unwrap();
        assert_eq!(marker.total_patterns, 2);
        assert!((marker.avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(marker.total_occurrences, 2);
        assert_eq!(marker.deprecated_count, 1);

        let tesseract = stats.iter().find(|s| s.engine == "tesseract").unwrap();
        assert_eq!(tesseract.total_patterns, 1);
        assert_eq!(tesseract.deprecated_count, 0);
        assert!(marker.reliability_score() > tesseract.reliability_score());
    }
}
