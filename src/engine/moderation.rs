//! Prayer request lifecycle and the suggested-update review workflow.

use chrono::{DateTime, Duration, Utc};

use super::PrayerService;
use crate::db::{
    parse_timestamp, timestamp, NewPrayerRequest, PendingSuggestion, PrayerCategory, PrayerEdit,
    PrayerRequest, PrayerRequestForm, PrayerStatus, SuggestedUpdate, SuggestionStatus,
    SuggestionWithAuthor, User,
};
use crate::validation::{self, check, non_blank};
use crate::{Error, Result};

/// Outcome of a review decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Review {
    Approve,
    Reject,
}

impl Review {
    fn target_status(self) -> SuggestionStatus {
        match self {
            Review::Approve => SuggestionStatus::Approved,
            Review::Reject => SuggestionStatus::Rejected,
        }
    }
}

/// Next `updated_at` value: `now`, or one microsecond past `previous` when the
/// clock has not moved past it
fn advance(previous: &str, now: DateTime<Utc>) -> String {
    let candidate = timestamp(now);
    if candidate.as_str() > previous {
        return candidate;
    }
    match parse_timestamp(previous) {
        Some(prev) => timestamp(prev + Duration::microseconds(1)),
        None => candidate,
    }
}

impl PrayerService {
    /// Store a new prayer request.
    ///
    /// Without a submitter the request is a guest submission and is always
    /// public, whatever the form says.
    pub async fn create_prayer_request(
        &self,
        form: PrayerRequestForm,
        submitter: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        check(
            "title",
            validation::validate_text("Title", &form.title, validation::MAX_TITLE_LEN),
        )?;
        check(
            "content",
            validation::validate_text("Content", &form.content, validation::MAX_CONTENT_LEN),
        )?;
        check(
            "requester_name",
            validation::validate_text(
                "Requester name",
                &form.requester_name,
                validation::MAX_NAME_LEN,
            ),
        )?;
        check(
            "category",
            validation::validate_text("Category", &form.category, validation::MAX_NAME_LEN),
        )?;
        let requester_email = non_blank(form.requester_email.as_deref());
        if let Some(email) = requester_email {
            check("requester_email", validation::validate_email(email))?;
        }

        let is_private = submitter.is_some() && form.is_private;
        let new = NewPrayerRequest {
            title: form.title.trim(),
            content: form.content.trim(),
            requester_name: form.requester_name.trim(),
            requester_email,
            submitted_by: submitter.map(|u| u.id),
            category: form.category.trim(),
            is_private,
        };

        let id = PrayerRequest::insert(&self.db, &new, &timestamp(now)).await?;

        tracing::info!(
            prayer_id = id,
            submitted_by = ?new.submitted_by,
            category = %new.category,
            is_private,
            "Prayer request created"
        );
        Ok(id)
    }

    /// Non-archived requests visible to the viewer, by category priority and
    /// then most recent activity
    pub async fn list_prayer_requests(
        &self,
        category: Option<&str>,
        viewer_authenticated: bool,
    ) -> Result<Vec<PrayerRequest>> {
        let category = non_blank(category);
        let mut prayers = PrayerRequest::list_visible(&self.db, category, viewer_authenticated).await?;

        prayers.sort_by(|a, b| {
            let rank_a = self.config.category_rank(&a.category);
            let rank_b = self.config.category_rank(&b.category);
            rank_a
                .cmp(&rank_b)
                .then_with(|| b.last_activity().cmp(a.last_activity()))
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(prayers)
    }

    /// Fetch one request; private requests do not exist for guests
    pub async fn get_prayer_request(
        &self,
        id: i64,
        viewer_authenticated: bool,
    ) -> Result<PrayerRequest> {
        match PrayerRequest::get_by_id(&self.db, id).await? {
            Some(prayer) if viewer_authenticated || !prayer.is_private => Ok(prayer),
            _ => Err(Error::NotFound("Prayer request")),
        }
    }

    /// Active categories in configured priority order
    pub async fn list_categories(&self) -> Result<Vec<PrayerCategory>> {
        let mut categories = PrayerCategory::list_active(&self.db).await?;
        categories.sort_by_key(|c| (self.config.category_rank(&c.name), c.sort_order));
        Ok(categories)
    }

    pub async fn update_prayer_status(
        &self,
        id: i64,
        status: PrayerStatus,
        now: DateTime<Utc>,
    ) -> Result<PrayerRequest> {
        let current = PrayerRequest::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("Prayer request"))?;

        let updated_at = advance(&current.updated_at, now);
        if PrayerRequest::update_status(&self.db, id, status, &updated_at).await? == 0 {
            return Err(Error::NotFound("Prayer request"));
        }

        tracing::info!(
            prayer_id = id,
            from = current.status.as_str(),
            to = status.as_str(),
            "Prayer status changed"
        );
        self.get_prayer_request(id, true).await
    }

    /// Direct edit by an administrator; only the supplied fields change
    pub async fn edit_prayer_request(
        &self,
        id: i64,
        edit: PrayerEdit,
        now: DateTime<Utc>,
    ) -> Result<PrayerRequest> {
        if let Some(title) = &edit.title {
            check(
                "title",
                validation::validate_text("Title", title, validation::MAX_TITLE_LEN),
            )?;
        }
        if let Some(content) = &edit.content {
            check(
                "content",
                validation::validate_text("Content", content, validation::MAX_CONTENT_LEN),
            )?;
        }
        if let Some(category) = &edit.category {
            check(
                "category",
                validation::validate_text("Category", category, validation::MAX_NAME_LEN),
            )?;
        }

        let current = PrayerRequest::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("Prayer request"))?;

        let updated_at = advance(&current.updated_at, now);
        if PrayerRequest::update_fields(&self.db, id, &edit, &updated_at).await? == 0 {
            return Err(Error::NotFound("Prayer request"));
        }

        tracing::info!(prayer_id = id, "Prayer request edited");
        self.get_prayer_request(id, true).await
    }

    /// Remove a request together with all of its suggestions.
    /// Returns the number of suggestions removed.
    pub async fn delete_prayer_request(&self, id: i64) -> Result<u64> {
        let mut tx = self.db.begin().await?;

        let suggestions = sqlx::query("DELETE FROM suggested_updates WHERE prayer_request_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM prayer_requests WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound("Prayer request"));
        }

        tx.commit().await?;

        tracing::info!(prayer_id = id, suggestions_removed = suggestions, "Prayer request deleted");
        Ok(suggestions)
    }

    /// Propose new content for a request. Always enters `pending`.
    pub async fn create_suggested_update(
        &self,
        prayer_id: i64,
        content: &str,
        suggester: &User,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        check(
            "suggested_content",
            validation::validate_text("Suggested content", content, validation::MAX_CONTENT_LEN),
        )?;

        let prayer = self.get_prayer_request(prayer_id, true).await?;
        if prayer.status == PrayerStatus::Archived {
            return Err(Error::NotFound("Prayer request"));
        }

        let id = SuggestedUpdate::insert(
            &self.db,
            prayer_id,
            suggester.id,
            content.trim(),
            &timestamp(now),
        )
        .await?;

        tracing::info!(
            suggestion_id = id,
            prayer_id,
            suggested_by = suggester.id,
            "Suggested update submitted"
        );
        Ok(id)
    }

    pub async fn get_suggested_update(&self, id: i64) -> Result<SuggestedUpdate> {
        SuggestedUpdate::get_by_id(&self.db, id)
            .await?
            .ok_or(Error::NotFound("Suggested update"))
    }

    /// Review queue, oldest first
    pub async fn list_pending_suggestions(&self) -> Result<Vec<PendingSuggestion>> {
        Ok(SuggestedUpdate::list_pending(&self.db).await?)
    }

    pub async fn list_suggestions_for(&self, prayer_id: i64) -> Result<Vec<SuggestionWithAuthor>> {
        Ok(SuggestedUpdate::list_for_prayer(&self.db, prayer_id).await?)
    }

    /// Approve a pending suggestion and copy its content into the prayer
    /// request, as one transaction.
    pub async fn approve_suggested_update(
        &self,
        id: i64,
        reviewer: &User,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SuggestedUpdate> {
        self.review(id, Review::Approve, reviewer, notes, now).await
    }

    /// Reject a pending suggestion; the prayer request is left untouched
    pub async fn reject_suggested_update(
        &self,
        id: i64,
        reviewer: &User,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SuggestedUpdate> {
        self.review(id, Review::Reject, reviewer, notes, now).await
    }

    async fn review(
        &self,
        id: i64,
        decision: Review,
        reviewer: &User,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SuggestedUpdate> {
        let notes = non_blank(notes);
        if let Some(notes) = notes {
            check(
                "admin_notes",
                validation::validate_text("Notes", notes, validation::MAX_NOTES_LEN),
            )?;
        }
        let reviewed_at = timestamp(now);
        let status = decision.target_status();

        let mut tx = self.db.begin().await?;

        // Only a pending suggestion can be claimed; a second reviewer sees zero rows
        let claimed = sqlx::query(
            r#"
            UPDATE suggested_updates
            SET status = ?, reviewed_by = ?, reviewed_at = ?, admin_notes = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(reviewer.id)
        .bind(&reviewed_at)
        .bind(notes)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let suggestion: Option<SuggestedUpdate> = sqlx::query_as(
            r#"
            SELECT id, prayer_request_id, suggested_by, suggested_content, status,
                   admin_notes, reviewed_by, reviewed_at, created_at
            FROM suggested_updates WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let suggestion = suggestion.ok_or(Error::NotFound("Suggested update"))?;
        if claimed == 0 {
            return Err(Error::Conflict(format!(
                "Suggested update has already been {}",
                suggestion.status.as_str()
            )));
        }

        if decision == Review::Approve {
            let parent_updated_at: Option<String> =
                sqlx::query_scalar("SELECT updated_at FROM prayer_requests WHERE id = ?")
                    .bind(suggestion.prayer_request_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let parent_updated_at = parent_updated_at.ok_or_else(|| {
                tracing::error!(
                    suggestion_id = id,
                    prayer_id = suggestion.prayer_request_id,
                    "Approved suggestion references a missing prayer request"
                );
                Error::Inconsistent(format!(
                    "suggestion {} references missing prayer request {}",
                    id, suggestion.prayer_request_id
                ))
            })?;

            let written = sqlx::query(
                "UPDATE prayer_requests SET content = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&suggestion.suggested_content)
            .bind(advance(&parent_updated_at, now))
            .bind(suggestion.prayer_request_id)
            .execute(&mut *tx)
            .await;

            match written {
                Ok(result) if result.rows_affected() == 1 => {}
                Ok(_) => {
                    return Err(Error::Inconsistent(format!(
                        "prayer request {} was not updated by approval of suggestion {}",
                        suggestion.prayer_request_id, id
                    )));
                }
                Err(e) => {
                    tracing::error!(
                        suggestion_id = id,
                        prayer_id = suggestion.prayer_request_id,
                        error = %e,
                        "Failed to apply approved suggestion, rolling back"
                    );
                    return Err(Error::Inconsistent(format!(
                        "applying suggestion {} failed: {}",
                        id, e
                    )));
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            suggestion_id = id,
            prayer_id = suggestion.prayer_request_id,
            reviewed_by = reviewer.id,
            status = status.as_str(),
            "Suggested update reviewed"
        );
        Ok(suggestion)
    }
}
