// Canonical (PascalCase) Chinook identifiers and their dialect literals.

/// Canonical column name to PostgreSQL column name.
pub const PG_COLUMNS: &[(&str, &str)] = &[
    ("InvoiceId", "invoice_id"),
    ("CustomerId", "customer_id"),
    ("TrackId", "track_id"),
    ("InvoiceDate", "invoice_date"),
    ("Total", "total"),
    ("FirstName", "first_name"),
    ("LastName", "last_name"),
    ("Email", "email"),
    ("Country", "country"),
    ("Composer", "composer"),
    ("GenreId", "genre_id"),
    ("Milliseconds", "milliseconds"),
    ("UnitPrice", "unit_price"),
    ("Quantity", "quantity"),
    ("Name", "name"),
    ("Title", "title"),
    ("AlbumId", "album_id"),
    ("ArtistId", "artist_id"),
    ("BillingAddress", "billing_address"),
    ("BillingCity", "billing_city"),
    ("BillingState", "billing_state"),
    ("BillingCountry", "billing_country"),
    ("BillingPostalCode", "billing_postal_code"),
    ("Company", "company"),
    ("Address", "address"),
    ("City", "city"),
    ("State", "state"),
    ("PostalCode", "postal_code"),
    ("Phone", "phone"),
    ("Fax", "fax"),
    ("SupportRepId", "support_rep_id"),
    ("InvoiceLineId", "invoice_line_id"),
    ("MediaTypeId", "media_type_id"),
    ("Bytes", "bytes"),
    ("EmployeeId", "employee_id"),
    ("ReportsTo", "reports_to"),
    ("BirthDate", "birth_date"),
    ("HireDate", "hire_date"),
    ("PlaylistId", "playlist_id"),
];

/// Canonical table name to PostgreSQL table name (schema-qualified).
pub const PG_TABLES: &[(&str, &str)] = &[
    ("Customer", "public.customer"),
    ("Invoice", "public.invoice"),
    ("InvoiceLine", "public.invoice_line"),
    ("Track", "public.track"),
    ("Employee", "public.employee"),
    ("AppConfig", "public.app_config"),
    ("Offers", "public.offers"),
    ("Album", "public.album"),
    ("Artist", "public.artist"),
    ("Genre", "public.genre"),
    ("MediaType", "public.media_type"),
    ("Playlist", "public.playlist"),
    ("PlaylistTrack", "public.playlist_track"),
    ("SystemLog", "public.system_log"),
];

/// Oracle names that differ from a plain uppercase transform.
pub const ORACLE_TABLES: &[(&str, &str)] = &[("SystemLog", "SYSTEM_LOG")];

pub fn lookup<'a>(table: &'a [(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

pub fn reverse_lookup<'a>(table: &'a [(&'a str, &'a str)], value: &str) -> Option<&'a str> {
    table.iter().find(|(_, v)| *v == value).map(|(k, _)| *k)
}

/// `postal_code` → `PostalCode`
pub fn snake_to_pascal(key: &str) -> String {
    if let Some(canonical) = reverse_lookup(PG_COLUMNS, key) {
        return canonical.to_string();
    }
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// `POSTALCODE` → `PostalCode`, falling back to `Postalcode` for unknown keys.
pub fn upper_to_pascal(key: &str) -> String {
    if let Some((canonical, _)) = PG_COLUMNS
        .iter()
        .find(|(canonical, _)| canonical.to_uppercase() == key)
    {
        return canonical.to_string();
    }
    capitalize(key)
}

/// First character uppercased, the rest lowercased.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
