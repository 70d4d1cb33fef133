//! CSV bulk import of prayer requests.
//!
//! Import is best effort: every row is validated on its own, bad rows are
//! skipped and reported, good rows are inserted. The outcome is kept as an
//! import log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PrayerService;
use crate::config::DEFAULT_CATEGORY;
use crate::db::{timestamp, ImportLog, NewPrayerRequest, PrayerRequest, User};
use crate::validation::{self, non_blank};
use crate::{Error, Result};

/// One record of an import file, before validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportRow {
    /// Data row number in the source file; the header is row 0
    #[serde(default)]
    pub row: u64,
    pub title: String,
    pub content: String,
    pub requester_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub requester_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub success_count: i64,
    pub failed_count: i64,
    pub errors: Vec<String>,
    pub import_log_id: i64,
}

/// Column positions resolved from the header row
struct Columns {
    title: usize,
    content: usize,
    requester_name: usize,
    category: Option<usize>,
    requester_email: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
            .collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));

        // `name` is what older exports used for the title column
        let title = find(&["title", "name"])
            .ok_or_else(|| Error::validation("file", "CSV needs a 'title' or 'name' column"))?;
        let content = find(&["content"])
            .ok_or_else(|| Error::validation("file", "CSV needs a 'content' column"))?;
        let requester_name = find(&["requester_name", "requester"]).ok_or_else(|| {
            Error::validation("file", "CSV needs a 'requester_name' or 'requester' column")
        })?;

        Ok(Self {
            title,
            content,
            requester_name,
            category: find(&["category"]),
            requester_email: find(&["requester_email", "email"]),
        })
    }

    fn row(&self, record: &csv::StringRecord, row: u64) -> ImportRow {
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let optional = |i: Option<usize>| {
            i.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        ImportRow {
            row,
            title: field(self.title),
            content: field(self.content),
            requester_name: field(self.requester_name),
            category: optional(self.category),
            requester_email: optional(self.requester_email),
        }
    }
}

/// Parse an uploaded CSV file into import rows.
///
/// Header names are case-insensitive. Short rows are accepted and their
/// missing cells read as empty, so they fail row validation rather than the
/// whole file.
pub fn parse_csv(data: &[u8]) -> Result<Vec<ImportRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| Error::validation("file", format!("Unreadable CSV header: {}", e)))?
        .clone();
    let columns = Columns::resolve(&headers)?;
    let header_line = headers.position().map_or(1, |p| p.line());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            Error::validation("file", format!("Row {}: unreadable record: {}", index + 1, e))
        })?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        // Count from the file itself so skipped blank lines keep row numbers aligned
        let line = record
            .position()
            .map_or(header_line + index as u64 + 1, |p| p.line());
        rows.push(columns.row(&record, line.saturating_sub(header_line)));
    }

    Ok(rows)
}

fn validate_row(row: &ImportRow) -> std::result::Result<(), String> {
    validation::validate_text("Title", &row.title, validation::MAX_TITLE_LEN)?;
    validation::validate_text("Content", &row.content, validation::MAX_CONTENT_LEN)?;
    validation::validate_text("Requester name", &row.requester_name, validation::MAX_NAME_LEN)?;
    if let Some(category) = non_blank(row.category.as_deref()) {
        validation::validate_text("Category", category, validation::MAX_NAME_LEN)?;
    }
    if let Some(email) = non_blank(row.requester_email.as_deref()) {
        validation::validate_email(email)?;
    }
    Ok(())
}

impl PrayerService {
    /// Insert every valid row as a public, active request with no submitter.
    ///
    /// Invalid rows never abort the import. All failure reasons are returned;
    /// the stored import log keeps at most `import_error_log_cap` of them.
    pub async fn bulk_import(
        &self,
        rows: Vec<ImportRow>,
        importer: &User,
        filename: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ImportResult> {
        let created_at = timestamp(now);
        let mut success_count = 0i64;
        let mut errors = Vec::new();

        for row in &rows {
            let line = row.row;
            if let Err(reason) = validate_row(row) {
                errors.push(format!("Row {}: {}", line, reason));
                continue;
            }

            let new = NewPrayerRequest {
                title: row.title.trim(),
                content: row.content.trim(),
                requester_name: row.requester_name.trim(),
                requester_email: non_blank(row.requester_email.as_deref()),
                submitted_by: None,
                category: non_blank(row.category.as_deref()).unwrap_or(DEFAULT_CATEGORY),
                is_private: false,
            };

            match PrayerRequest::insert(&self.db, &new, &created_at).await {
                Ok(_) => success_count += 1,
                Err(e) => {
                    tracing::warn!(row = line, error = %e, "Failed to insert imported row");
                    errors.push(format!("Row {}: could not be saved", line));
                }
            }
        }

        let failed_count = errors.len() as i64;
        let logged = &errors[..errors.len().min(self.config.import_error_log_cap)];
        let import_log_id = ImportLog::insert(
            &self.db,
            importer.id,
            filename,
            success_count,
            failed_count,
            logged,
            &created_at,
        )
        .await?;

        tracing::info!(
            import_log_id,
            imported_by = importer.id,
            success_count,
            failed_count,
            "Bulk import finished"
        );

        Ok(ImportResult {
            success_count,
            failed_count,
            errors,
            import_log_id,
        })
    }

    pub async fn list_import_logs(&self, limit: i64) -> Result<Vec<ImportLog>> {
        Ok(ImportLog::list_recent(&self.db, limit.clamp(1, 200)).await?)
    }

    pub async fn get_import_log(&self, id: i64) -> Result<ImportLog> {
        ImportLog::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("Import log"))
    }
}
