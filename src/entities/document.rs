// Document metadata. File bytes live wherever file_path points; this module
// never reads or writes them.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::db::timestamp_column;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub resident_id: Option<i64>,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    /// medical, legal, personal, general
    pub document_type: String,
    pub description: Option<String>,
    pub uploaded_by: Option<String>,
    pub is_confidential: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub resident_id: Option<i64>,
    pub filename: String,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub document_type: String,
    pub description: Option<String>,
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub is_confidential: bool,
}

impl NewDocument {
    pub fn new(filename: &str, file_path: &str, document_type: &str) -> Self {
        NewDocument {
            resident_id: None,
            filename: filename.to_string(),
            file_path: file_path.to_string(),
            file_size: None,
            mime_type: None,
            document_type: document_type.to_string(),
            description: None,
            uploaded_by: None,
            is_confidential: false,
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, resident_id, filename, original_filename, file_path,
    file_size, mime_type, document_type, description, uploaded_by, is_confidential, created_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        filename: row.get(2)?,
        original_filename: row.get(3)?,
        file_path: row.get(4)?,
        file_size: row.get(5)?,
        mime_type: row.get(6)?,
        document_type: row.get(7)?,
        description: row.get(8)?,
        uploaded_by: row.get(9)?,
        is_confidential: row.get(10)?,
        created_at: timestamp_column(row, 11)?,
    })
}

/// The submitted filename is kept as original_filename.
pub fn insert_document(conn: &Connection, document: &NewDocument) -> Result<Document> {
    conn.execute(
        "INSERT INTO documents (
            resident_id, filename, original_filename, file_path, file_size, mime_type,
            document_type, description, uploaded_by, is_confidential, created_at
        ) VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            document.resident_id,
            document.filename,
            document.file_path,
            document.file_size,
            document.mime_type,
            document.document_type,
            document.description,
            document.uploaded_by,
            document.is_confidential,
            Utc::now().to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    let document = conn.query_row(
        &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
        [id],
        document_from_row,
    )?;
    Ok(document)
}

pub fn get_documents(conn: &Connection, skip: u32, limit: u32) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let documents = stmt
        .query_map(params![limit, skip], document_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(documents)
}

pub fn get_resident_documents(conn: &Connection, resident_id: i64) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE resident_id = ?1 ORDER BY id"
    ))?;
    let documents = stmt
        .query_map([resident_id], document_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{admit_test_resident, open_in_memory};

    #[test]
    fn test_documents_by_resident() {
        let conn = open_in_memory().unwrap();
        let mut consent = NewDocument::new("consent.pdf", "uploads/legal/20240101_consent.pdf", "legal");
        let rid = admit_test_resident(&conn, "Ada");
        consent.resident_id = Some(rid);
        consent.is_confidential = true;

        let stored = insert_document(&conn, &consent).unwrap();
        assert_eq!(stored.original_filename, "consent.pdf");
        assert!(stored.is_confidential);

        insert_document(&conn, &NewDocument::new("menu.pdf", "uploads/general/menu.pdf", "general")).unwrap();

        assert_eq!(get_resident_documents(&conn, rid).unwrap(), vec![stored]);
        assert_eq!(get_documents(&conn, 0, 10).unwrap().len(), 2);
    }
}
