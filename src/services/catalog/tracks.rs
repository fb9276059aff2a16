use serde_json::Value;

use super::fetch_page;
use super::search::{search_condition, SearchField, SearchTerm};
use crate::api::middleware::AppError;
use crate::models::{ListParams, TrackPage};
use crate::services::db_service::DbSession;
use crate::services::normalizer::project;
use crate::services::query_builder::{Condition, SelectQuery};

const TRACK_FIELDS: &[&str] = &[
    "TrackId",
    "Name",
    "UnitPrice",
    "Milliseconds",
    "AlbumId",
    "AlbumTitle",
    "ArtistName",
];

/// Tracks with album and artist, optionally restricted to one album.
pub async fn list_tracks(session: &DbSession, params: &ListParams) -> Result<TrackPage, AppError> {
    let d = session.dialect();
    let limit = params.limit(20);
    let offset = params.offset();

    let base = SelectQuery::from(d, "Track", Some("t"))
        .left_join(
            "Album",
            "al",
            format!("{} = {}", d.qualified("t", "AlbumId"), d.qualified("al", "AlbumId")),
        )
        .left_join(
            "Artist",
            "ar",
            format!("{} = {}", d.qualified("al", "ArtistId"), d.qualified("ar", "ArtistId")),
        );
    let fields = [
        SearchField::text("Name", base.col("t", "Name")),
        SearchField::text("AlbumTitle", base.col("al", "Title")),
        SearchField::text("ArtistName", base.col("ar", "Name")),
    ];
    let filter = SearchTerm::from_params(params, 2).map(|s| search_condition(d, &fields, &s));
    let album = params
        .album_id()
        .map(|id| Condition::eq(d.qualified("t", "AlbumId"), id));
    let base = base.filter_opt(filter).filter_opt(album);

    let query = base
        .clone()
        .column_as(d.qualified("t", "TrackId"), "TrackId")
        .column_as(d.qualified("t", "Name"), "Name")
        .column_as(d.qualified("t", "UnitPrice"), "UnitPrice")
        .column_as(d.qualified("t", "Milliseconds"), "Milliseconds")
        .column_as(d.qualified("t", "AlbumId"), "AlbumId")
        .column_as(d.qualified("al", "Title"), "AlbumTitle")
        .column_as(d.qualified("ar", "Name"), "ArtistName")
        .order_by(d.qualified("t", "TrackId"), false)
        .paginate(limit, offset);

    let fetched = fetch_page(session, &query.build(), &base.count()).await?;
    let tracks: Vec<Value> = fetched
        .rows
        .iter()
        .map(|row| Value::Object(project(row, TRACK_FIELDS)))
        .collect();

    tracing::info!(
        "Tracks query OK: {} rows of {} in {}ms (conn: {})",
        tracks.len(),
        fetched.total,
        fetched.time_ms,
        session.name
    );
    Ok(TrackPage {
        tracks,
        total: fetched.total,
        limit,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::super::testing::{scripted, ALL_CLIENTS};
    use super::*;
    use crate::models::SqlValue;

    #[tokio::test]
    async fn test_album_filter_and_default_limit() {
        for client in ALL_CLIENTS {
            let (session, adapter) = scripted(client, 10, vec![]);
            let params = ListParams {
                album_id: Some("1".into()),
                ..Default::default()
            };
            let page = list_tracks(&session, &params).await.unwrap();
            assert_eq!((page.total, page.limit, page.offset), (10, 20, 0));

            for query in adapter.recorded() {
                assert_eq!(query.params, vec![SqlValue::Int(1)], "{}", client);
                assert!(query.sql.contains(" = "), "{}", query.sql);
            }
        }
    }
}
