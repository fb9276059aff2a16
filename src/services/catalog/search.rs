use chrono::NaiveDate;

use crate::models::entity::fold_key;
use crate::models::{ColumnKind, ListParams};
use crate::services::dialect::Dialect;
use crate::services::query_builder::Condition;

/// A searchable expression and how its values compare.
#[derive(Debug, Clone)]
pub struct SearchField {
    pub name: String,
    pub expr: String,
    pub kind: ColumnKind,
}

impl SearchField {
    pub fn new(name: impl Into<String>, expr: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::new(name, expr, ColumnKind::Text)
    }

    pub fn numeric(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::new(name, expr, ColumnKind::Numeric)
    }
}

/// The `search`, `searchColumn` and `exactMatch` parameters of a list request.
#[derive(Debug, Clone, Copy)]
pub struct SearchTerm<'a> {
    pub term: &'a str,
    pub column: Option<&'a str>,
    pub exact: bool,
}

impl<'a> SearchTerm<'a> {
    /// `None` when there is no search or it is shorter than `min_len` characters.
    pub fn from_params(params: &'a ListParams, min_len: usize) -> Option<Self> {
        let term = params.search()?.trim();
        if term.chars().count() < min_len {
            return None;
        }
        Some(Self {
            term,
            column: params.search_column(),
            exact: params.exact_match(),
        })
    }
}

/// OR of per-field predicates. `searchColumn` narrows the fields when it names one of them.
///
/// Exact searches only ever produce equality predicates. Fields that cannot match the
/// term (an integer column and a non-numeric term) are skipped; when none remain the
/// condition matches nothing.
pub fn search_condition(dialect: &dyn Dialect, fields: &[SearchField], search: &SearchTerm<'_>) -> Condition {
    let targeted: Vec<&SearchField> = match search.column {
        Some(column) => {
            let wanted = fold_key(column);
            let matching: Vec<&SearchField> = fields
                .iter()
                .filter(|field| fold_key(&field.name) == wanted)
                .collect();
            if matching.is_empty() {
                fields.iter().collect()
            } else {
                matching
            }
        }
        None => fields.iter().collect(),
    };

    Condition::any(
        targeted
            .into_iter()
            .filter_map(|field| field_condition(dialect, field, search))
            .collect(),
    )
}

fn field_condition(dialect: &dyn Dialect, field: &SearchField, search: &SearchTerm<'_>) -> Option<Condition> {
    let term = search.term;
    let contains = |value: &str| format!("%{}%", value);

    match field.kind {
        ColumnKind::Integer => term
            .parse::<i64>()
            .ok()
            .map(|n| Condition::eq(field.expr.as_str(), n)),
        ColumnKind::Numeric if search.exact => term
            .parse::<f64>()
            .ok()
            .map(|n| Condition::eq(field.expr.as_str(), n)),
        ColumnKind::Numeric => Some(Condition::like(
            dialect.text_cast(&field.expr),
            contains(term),
        )),
        ColumnKind::Date if search.exact => {
            is_full_date(term).then(|| Condition::eq(dialect.date_text(&field.expr), term))
        }
        ColumnKind::Date => Some(Condition::like(
            dialect.date_text(&field.expr),
            contains(term),
        )),
        ColumnKind::Text if search.exact => Some(Condition::eq(field.expr.as_str(), term)),
        ColumnKind::Text => Some(Condition::like(
            format!("LOWER({})", field.expr),
            contains(&term.to_lowercase()),
        )),
    }
}

fn is_full_date(term: &str) -> bool {
    term.len() == 10 && NaiveDate::parse_from_str(term, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientKind, SqlValue};
    use crate::services::dialect::dialect_for;
    use crate::services::query_builder::Operand;

    fn params(search: &str, column: Option<&str>, exact: bool) -> ListParams {
        ListParams {
            search: Some(search.to_string()),
            search_column: column.map(str::to_string),
            exact_match: exact.then(|| "1".to_string()),
            ..Default::default()
        }
    }

    fn fields() -> Vec<SearchField> {
        vec![
            SearchField::new("InvoiceId", "i.InvoiceId", ColumnKind::Integer),
            SearchField::numeric("Total", "i.Total"),
            SearchField::new("InvoiceDate", "i.InvoiceDate", ColumnKind::Date),
            SearchField::text("BillingCity", "i.BillingCity"),
        ]
    }

    fn collect_ops(condition: &Condition, ops: &mut Vec<&'static str>) {
        match condition {
            Condition::Compare { op, .. } => ops.push(op),
            Condition::Any(items) | Condition::All(items) => {
                items.iter().for_each(|c| collect_ops(c, ops))
            }
            _ => {}
        }
    }

    #[test]
    fn test_min_length() {
        let p = params("a", None, false);
        assert!(SearchTerm::from_params(&p, 2).is_none());
        assert!(SearchTerm::from_params(&p, 1).is_some());
        assert!(SearchTerm::from_params(&ListParams::default(), 1).is_none());
    }

    #[test]
    fn test_exact_match_uses_equality_only() {
        let dialect = dialect_for(ClientKind::MsSql);
        for term in ["2021-01-01", "Oslo", "42", "2021-01"] {
            let p = params(term, None, true);
            let search = SearchTerm::from_params(&p, 1).unwrap();
            let condition = search_condition(dialect.as_ref(), &fields(), &search);
            let mut ops = Vec::new();
            collect_ops(&condition, &mut ops);
            assert!(ops.iter().all(|op| *op == "="), "{}: {:?}", term, ops);
        }
    }

    #[test]
    fn test_fuzzy_search_lowercases_text() {
        let dialect = dialect_for(ClientKind::Postgres);
        let p = params("OsLo", Some("billingCity"), false);
        let search = SearchTerm::from_params(&p, 2).unwrap();
        let condition = search_condition(dialect.as_ref(), &fields(), &search);
        assert_eq!(
            condition,
            Condition::Compare {
                lhs: "LOWER(i.BillingCity)".to_string(),
                op: "LIKE",
                rhs: Operand::Value(SqlValue::Text("%oslo%".to_string())),
            }
        );
    }

    #[test]
    fn test_integer_fields_need_numeric_terms() {
        let dialect = dialect_for(ClientKind::MySql);
        let p = params("abc", Some("InvoiceId"), false);
        let search = SearchTerm::from_params(&p, 2).unwrap();
        assert_eq!(
            search_condition(dialect.as_ref(), &fields(), &search),
            Condition::Never
        );

        let p = params("2021-03", Some("InvoiceDate"), false);
        let search = SearchTerm::from_params(&p, 2).unwrap();
        match search_condition(dialect.as_ref(), &fields(), &search) {
            Condition::Compare { lhs, op, .. } => {
                assert_eq!(lhs, "DATE_FORMAT(i.InvoiceDate, '%Y-%m-%d')");
                assert_eq!(op, "LIKE");
            }
            other => panic!("unexpected condition: {:?}", other),
        }
    }
}
