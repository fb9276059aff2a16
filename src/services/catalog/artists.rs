use serde_json::{json, Value};
use std::collections::HashMap;

use super::fetch_page;
use super::search::{search_condition, SearchField, SearchTerm};
use crate::api::middleware::AppError;
use crate::models::{ListParams, Page, SqlValue};
use crate::services::db_service::DbSession;
use crate::services::normalizer::{pick, pick_i64};
use crate::services::query_builder::{Condition, SelectQuery};

/// Artists ordered by name with their album and track counts.
pub async fn list_artists(session: &DbSession, params: &ListParams) -> Result<Page, AppError> {
    let d = session.dialect();
    let limit = params.limit(50);
    let offset = params.offset();

    let artists = SelectQuery::from(d, "Artist", Some("ar"));
    let fields = [SearchField::text("Name", artists.col("ar", "Name"))];
    let filter = SearchTerm::from_params(params, 2).map(|s| search_condition(d, &fields, &s));
    let artists = artists.filter_opt(filter);

    let query = artists
        .clone()
        .left_join(
            "Album",
            "al",
            format!("{} = {}", d.qualified("ar", "ArtistId"), d.qualified("al", "ArtistId")),
        )
        .column_as(d.qualified("ar", "ArtistId"), "ArtistId")
        .column_as(d.qualified("ar", "Name"), "Name")
        .column_as(format!("COUNT({})", d.qualified("al", "ArtistId")), "AlbumCount")
        .group_by(d.qualified("ar", "ArtistId"))
        .group_by(d.qualified("ar", "Name"))
        .order_by(d.qualified("ar", "Name"), false)
        .paginate(limit, offset);

    let fetched = fetch_page(session, &query.build(), &artists.count()).await?;

    let ids: Vec<i64> = fetched
        .rows
        .iter()
        .filter_map(|row| pick_i64(row, "ArtistId"))
        .collect();
    let track_counts = match track_counts(session, &ids).await {
        Ok(counts) => counts,
        Err(e) => {
            tracing::warn!("Could not fetch track counts: {}", e);
            HashMap::new()
        }
    };

    let rows: Vec<Value> = fetched
        .rows
        .iter()
        .map(|row| {
            let id = pick_i64(row, "ArtistId");
            json!({
                "ArtistId": pick(row, "ArtistId").cloned().unwrap_or(Value::Null),
                "Name": pick(row, "Name").cloned().unwrap_or(Value::Null),
                "AlbumCount": pick_i64(row, "AlbumCount").unwrap_or(0),
                "TrackCount": id.and_then(|id| track_counts.get(&id).copied()).unwrap_or(0),
            })
        })
        .collect();

    tracing::info!(
        "Artists query OK: {} rows of {} in {}ms (conn: {})",
        rows.len(),
        fetched.total,
        fetched.time_ms,
        session.name
    );
    Ok(Page::new(rows, fetched.total, fetched.time_ms))
}

/// Tracks per artist, for the artists on the current page only.
async fn track_counts(session: &DbSession, artist_ids: &[i64]) -> Result<HashMap<i64, i64>, AppError> {
    if artist_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let d = session.dialect();
    let artist_col = d.qualified("al", "ArtistId");
    let query = SelectQuery::from(d, "Track", Some("t"))
        .left_join(
            "Album",
            "al",
            format!("{} = {}", d.qualified("t", "AlbumId"), d.qualified("al", "AlbumId")),
        )
        .column_as(artist_col.as_str(), "ArtistId")
        .column_as("COUNT(*)", "TrackCount")
        .filter(Condition::is_in(
            artist_col.as_str(),
            artist_ids.iter().copied().map(SqlValue::Int).collect(),
        ))
        .group_by(artist_col.as_str());

    let rows = session.query_rows(&query.build()).await?;
    Ok(rows
        .iter()
        .filter_map(|row| Some((pick_i64(row, "ArtistId")?, pick_i64(row, "TrackCount")?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::super::testing::scripted;
    use super::*;
    use crate::services::database::testing::RecordingAdapter;
    use crate::models::ClientKind;
    use crate::services::db_service::testing::session;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_album_and_track_counts() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::Oracle, |query| {
            if query.sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![json!({ "TOTAL": 275 })])
            } else if query.sql.contains("TRACK") {
                Ok(vec![json!({ "ARTISTID": 1, "TRACKCOUNT": 18 })])
            } else {
                Ok(vec![
                    json!({ "ARTISTID": 1, "NAME": "AC/DC", "ALBUMCOUNT": 2 }),
                    json!({ "ARTISTID": 2, "NAME": "Accept", "ALBUMCOUNT": 2 }),
                ])
            }
        }));
        let session = session(ClientKind::Oracle, Arc::clone(&adapter));
        let page = list_artists(&session, &ListParams::default()).await.unwrap();

        assert_eq!(page.total_rows, 275);
        assert_eq!(
            page.rows[0],
            json!({ "ArtistId": 1, "Name": "AC/DC", "AlbumCount": 2, "TrackCount": 18 })
        );
        assert_eq!(page.rows[1]["TrackCount"], json!(0));

        let track_query = adapter
            .recorded()
            .into_iter()
            .find(|q| q.sql.contains("\"TRACK\""))
            .unwrap();
        assert!(track_query.sql.contains("IN (:1, :2)"), "{}", track_query.sql);
    }

    #[tokio::test]
    async fn test_track_count_failure_is_not_fatal() {
        let adapter = Arc::new(RecordingAdapter::with_responder(ClientKind::MySql, |query| {
            if query.sql.contains("`Track`") {
                Err(AppError::Database("boom".into()))
            } else if query.sql.starts_with("SELECT COUNT(*)") {
                Ok(vec![json!({ "total": 1 })])
            } else {
                Ok(vec![json!({ "ArtistId": 3, "Name": "Aerosmith", "AlbumCount": 1 })])
            }
        }));
        let session = session(ClientKind::MySql, adapter);
        let page = list_artists(&session, &ListParams::default()).await.unwrap();
        assert_eq!(page.rows[0]["TrackCount"], json!(0));
    }

    #[tokio::test]
    async fn test_count_ignores_grouping() {
        let (session, adapter) = scripted(ClientKind::MsSql, 0, vec![]);
        list_artists(&session, &ListParams::default()).await.unwrap();
        let count = adapter
            .sql()
            .into_iter()
            .find(|s| s.starts_with("SELECT COUNT(*)"))
            .unwrap();
        assert_eq!(count, "SELECT COUNT(*) AS total FROM [Artist] AS ar");
    }
}
