use serde_json::Value;

use super::fetch_page;
use super::search::{search_condition, SearchField, SearchTerm};
use crate::api::middleware::AppError;
use crate::models::{ListParams, Page};
use crate::services::db_service::DbSession;
use crate::services::normalizer::project;
use crate::services::query_builder::SelectQuery;

/// Albums with their artist name, ordered by artist then title.
pub async fn list_albums(session: &DbSession, params: &ListParams) -> Result<Page, AppError> {
    let d = session.dialect();
    let limit = params.limit(50);
    let offset = params.offset();

    let base = SelectQuery::from(d, "Album", Some("al")).left_join(
        "Artist",
        "ar",
        format!("{} = {}", d.qualified("al", "ArtistId"), d.qualified("ar", "ArtistId")),
    );
    let fields = [
        SearchField::text("Title", base.col("al", "Title")),
        SearchField::text("ArtistName", base.col("ar", "Name")),
    ];
    let filter = SearchTerm::from_params(params, 2).map(|s| search_condition(d, &fields, &s));
    let base = base.filter_opt(filter);

    let query = base
        .clone()
        .column_as(d.qualified("al", "AlbumId"), "AlbumId")
        .column_as(d.qualified("al", "Title"), "Title")
        .column_as(d.qualified("al", "ArtistId"), "ArtistId")
        .column_as(d.qualified("ar", "Name"), "ArtistName")
        .order_by(d.qualified("ar", "Name"), false)
        .order_by(d.qualified("al", "Title"), false)
        .paginate(limit, offset);

    let fetched = fetch_page(session, &query.build(), &base.count()).await?;
    let rows: Vec<Value> = fetched
        .rows
        .iter()
        .map(|row| {
            let mut album = project(row, &["AlbumId", "Title", "ArtistId", "ArtistName"]);
            if album.get("ArtistName").map_or(true, Value::is_null) {
                album.insert("ArtistName".to_string(), Value::String("Unknown Artist".to_string()));
            }
            Value::Object(album)
        })
        .collect();

    tracing::info!(
        "Albums query OK: {} rows of {} in {}ms (conn: {})",
        rows.len(),
        fetched.total,
        fetched.time_ms,
        session.name
    );
    Ok(Page::new(rows, fetched.total, fetched.time_ms))
}

#[cfg(test)]
mod tests {
    use super::super::testing::scripted;
    use super::*;
    use crate::models::ClientKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_albums_order_and_artist_fallback() {
        let rows = vec![
            json!({ "albumid": 1, "title": "For Those About To Rock", "artistid": 1, "artistname": "AC/DC" }),
            json!({ "albumid": 9, "title": "Orphan", "artistid": 99, "artistname": null }),
        ];
        let (session, adapter) = scripted(ClientKind::Postgres, 347, rows);
        let page = list_albums(&session, &ListParams::default()).await.unwrap();

        assert_eq!(page.total_rows, 347);
        assert_eq!(page.rows[0]["ArtistName"], json!("AC/DC"));
        assert_eq!(page.rows[1]["ArtistName"], json!("Unknown Artist"));

        let data = adapter
            .sql()
            .into_iter()
            .find(|s| !s.starts_with("SELECT COUNT(*)"))
            .unwrap();
        assert!(
            data.contains("ORDER BY ar.\"name\", al.\"title\" LIMIT 50 OFFSET 0"),
            "{}",
            data
        );
    }
}
