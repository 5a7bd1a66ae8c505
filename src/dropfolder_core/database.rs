use crate::dropfolder_core::error::{DropfolderError, Result};
use crate::dropfolder_core::store::{
    FileMetadata, NewRecord, RecordFields, RecordId, RecordStore, StoredRecord,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const RECORD_COLUMNS: &str = "id, author_id, title, content, excerpt, mime_type, slug, status, \
                              file, file_size, refreshed_at, variants_pending";

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY,
            author_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            excerpt TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            slug TEXT NOT NULL,
            status TEXT NOT NULL,
            file TEXT NOT NULL,
            file_size INTEGER,
            refreshed_at TEXT,
            variants_pending INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS record_tags (
            record_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
            UNIQUE (record_id, tag)
        );
        CREATE TABLE IF NOT EXISTS record_variants (
            record_id INTEGER NOT NULL,
            size_name TEXT NOT NULL,
            filename TEXT NOT NULL,
            FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
            UNIQUE (record_id, size_name)
        );
        CREATE TABLE IF NOT EXISTS record_attributes (
            record_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
            PRIMARY KEY (record_id, key)
        );
        CREATE INDEX IF NOT EXISTS idx_records_file ON records(file);
        CREATE INDEX IF NOT EXISTS idx_variants_filename ON record_variants(filename);
        "#,
    )])
}

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Connect to the database at the specified path, creating its folder
    /// if needed. Run migrations if necessary.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations().to_latest(&mut conn)?;
        Ok(SqliteStore { conn })
    }

    /// Register a size variant produced by the image processor.
    pub fn add_variant(&mut self, id: RecordId, size_name: &str, filename: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        ensure_exists(&tx, id)?;
        tx.execute(
            "INSERT INTO record_variants (record_id, size_name, filename) VALUES (?1, ?2, ?3)
             ON CONFLICT(record_id, size_name) DO UPDATE SET filename = excluded.filename",
            params![id, size_name, filename],
        )?;
        tx.execute(
            "UPDATE records SET variants_pending = 0 WHERE id = ?1",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// All records, oldest first.
    pub fn list_records(&self) -> Result<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM records ORDER BY id", RECORD_COLUMNS))?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            self.load_children(&mut record)?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn record_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }

    fn load_children(&self, record: &mut StoredRecord) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM record_tags WHERE record_id = ?1 ORDER BY rowid")?;
        record.tags = stmt
            .query_map(params![record.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT filename FROM record_variants WHERE record_id = ?1 ORDER BY size_name")?;
        record.variants = stmt
            .query_map(params![record.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let file_size: Option<i64> = row.get(9)?;
    Ok(StoredRecord {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        mime_type: row.get(5)?,
        slug: row.get(6)?,
        status: row.get(7)?,
        file: row.get(8)?,
        file_size: file_size.map(|s| s as u64),
        refreshed_at: row.get(10)?,
        variants_pending: row.get(11)?,
        tags: Vec::new(),
        variants: Vec::new(),
    })
}

fn now_string() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| DropfolderError::Other(format!("Failed to format timestamp: {}", e)))
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn ensure_exists(tx: &Transaction<'_>, id: RecordId) -> Result<()> {
    let found: Option<i64> = tx
        .query_row("SELECT id FROM records WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(DropfolderError::RecordNotFound(id)),
    }
}

fn replace_tags(tx: &Transaction<'_>, id: RecordId, tags: &[String]) -> Result<()> {
    tx.execute("DELETE FROM record_tags WHERE record_id = ?1", params![id])?;
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO record_tags (record_id, tag) VALUES (?1, ?2)",
            params![id, tag],
        )?;
    }
    Ok(())
}

impl RecordStore for SqliteStore {
    fn find_by_filename(&self, filename: &str) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT {} FROM records WHERE id IN (
                 SELECT r.id FROM records r
                 LEFT JOIN record_variants v ON v.record_id = r.id
                 WHERE r.file LIKE ?1 ESCAPE '\\' OR v.filename LIKE ?1 ESCAPE '\\'
             ) ORDER BY id",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![like_pattern(filename)], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            let mut record = row?;
            self.load_children(&mut record)?;
            records.push(record);
        }
        Ok(records)
    }

    fn create_record(&mut self, record: &NewRecord) -> Result<RecordId> {
        let now = now_string()?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (author_id, title, content, excerpt, mime_type, slug, status, file, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.author_id,
                record.fields.title,
                record.fields.content,
                record.fields.excerpt,
                record.mime_type,
                record.slug,
                record.status,
                record.file,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        replace_tags(&tx, id, &record.fields.tags)?;
        tx.commit()?;

        log::debug!("Created record {} for {}", id, record.file);
        Ok(id)
    }

    fn update_record(&mut self, id: RecordId, file: &str, fields: Option<&RecordFields>) -> Result<()> {
        let tx = self.conn.transaction()?;
        ensure_exists(&tx, id)?;
        tx.execute("UPDATE records SET file = ?1 WHERE id = ?2", params![file, id])?;
        if let Some(fields) = fields {
            tx.execute(
                "UPDATE records SET title = ?1, content = ?2, excerpt = ?3 WHERE id = ?4",
                params![fields.title, fields.content, fields.excerpt, id],
            )?;
            replace_tags(&tx, id, &fields.tags)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn attribute(&self, id: RecordId, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM record_attributes WHERE record_id = ?1 AND key = ?2",
                params![id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_attribute(&mut self, id: RecordId, key: &str, value: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        ensure_exists(&tx, id)?;
        tx.execute(
            "INSERT INTO record_attributes (record_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(record_id, key) DO UPDATE SET value = excluded.value",
            params![id, key, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn refresh_derivatives(&mut self, id: RecordId, metadata: &FileMetadata) -> Result<()> {
        let now = now_string()?;
        let changed = self.conn.execute(
            "UPDATE records SET file = ?1, file_size = ?2, refreshed_at = ?3, variants_pending = 1
             WHERE id = ?4",
            params![metadata.file, metadata.size_bytes as i64, now, id],
        )?;
        if changed == 0 {
            return Err(DropfolderError::RecordNotFound(id));
        }
        Ok(())
    }

    fn record(&self, id: RecordId) -> Result<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?;
        match record {
            Some(mut record) => {
                self.load_children(&mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dropfolder_core::store::RECORD_STATUS;

    fn new_record(file: &str) -> NewRecord {
        NewRecord {
            author_id: 1,
            mime_type: "image/jpeg".to_string(),
            slug: "harbour".to_string(),
            status: RECORD_STATUS.to_string(),
            file: file.to_string(),
            fields: RecordFields {
                title: "Harbour".to_string(),
                content: "Boats at dawn".to_string(),
                excerpt: "Boats at dawn".to_string(),
                tags: vec!["sea".to_string(), "boats".to_string()],
            },
        }
    }

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_create_and_read_back() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();

        let record = store.record(id).unwrap().unwrap();
        assert_eq!(record.title, "Harbour");
        assert_eq!(record.status, "inherit");
        assert_eq!(record.file_name(), "harbour.jpg");
        assert_eq!(record.tags, vec!["sea", "boats"]);
        assert!(record.variants.is_empty());
        assert!(store.record(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_find_by_filename_checks_variants() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();
        let b = store.create_record(&new_record("2024/05/other.jpg")).unwrap();
        store.add_variant(b, "thumbnail", "sunset-150x150.jpg").unwrap();

        let found = store.find_by_filename("harbour.jpg").unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a]);

        let found = store.find_by_filename("sunset-150x150.jpg").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b);
        assert_eq!(found[0].variants, vec!["sunset-150x150.jpg"]);

        assert!(store.find_by_filename("missing.jpg").unwrap().is_empty());
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.create_record(&new_record("2024/05/a_b.jpg")).unwrap();
        store.create_record(&new_record("2024/05/axb.jpg")).unwrap();

        let found = store.find_by_filename("a_b.jpg").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file, "2024/05/a_b.jpg");
        assert_eq!(like_pattern("100%"), "%100\\%%");
    }

    #[test]
    fn test_update_without_fields_keeps_title() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();

        store.update_record(id, "2024/06/harbour.jpg", None).unwrap();
        let record = store.record(id).unwrap().unwrap();
        assert_eq!(record.file, "2024/06/harbour.jpg");
        assert_eq!(record.title, "Harbour");

        let fields = RecordFields {
            title: "New".to_string(),
            tags: vec!["x".to_string()],
            ..Default::default()
        };
        store.update_record(id, "2024/06/harbour.jpg", Some(&fields)).unwrap();
        let record = store.record(id).unwrap().unwrap();
        assert_eq!(record.title, "New");
        assert_eq!(record.content, "");
        assert_eq!(record.tags, vec!["x"]);
    }

    #[test]
    fn test_missing_record_errors() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.update_record(42, "x.jpg", None),
            Err(DropfolderError::RecordNotFound(42))
        ));
        assert!(matches!(
            store.set_attribute(42, "alt_text", "x"),
            Err(DropfolderError::RecordNotFound(42))
        ));
        let metadata = FileMetadata {
            file: "x.jpg".to_string(),
            size_bytes: 1,
        };
        assert!(matches!(
            store.refresh_derivatives(42, &metadata),
            Err(DropfolderError::RecordNotFound(42))
        ));
    }

    #[test]
    fn test_attributes_upsert() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();

        assert_eq!(store.attribute(id, "location").unwrap(), None);
        store.set_attribute(id, "location", "1,2").unwrap();
        store.set_attribute(id, "location", "3,4").unwrap();
        assert_eq!(store.attribute(id, "location").unwrap().as_deref(), Some("3,4"));
    }

    #[test]
    fn test_refresh_derivatives_records_file_metadata() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();

        let metadata = FileMetadata {
            file: "2024/05/harbour.jpg".to_string(),
            size_bytes: 2048,
        };
        store.refresh_derivatives(id, &metadata).unwrap();
        let record = store.record(id).unwrap().unwrap();
        assert_eq!(record.file_size, Some(2048));
        assert!(record.refreshed_at.is_some());
        assert!(record.variants_pending);

        store.add_variant(id, "medium", "harbour-300x200.jpg").unwrap();
        assert!(!store.record(id).unwrap().unwrap().variants_pending);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join(".dropfolder/records.db");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.create_record(&new_record("2024/05/harbour.jpg")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.record_count().unwrap(), 1);
        assert_eq!(store.list_records().unwrap()[0].tags.len(), 2);
    }
}
