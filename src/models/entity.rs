/// Canonical description of a writable Chinook table.
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    pub table: &'static str,
    pub label: &'static str,
    pub id_column: &'static str,
    /// Writable columns, excluding the id
    pub fields: &'static [&'static str],
    pub required: &'static [&'static str],
}

impl EntitySpec {
    /// Matches a request key against the canonical fields, ignoring case and underscores
    /// so that `FirstName`, `firstName` and `first_name` all resolve.
    pub fn field(&self, key: &str) -> Option<&'static str> {
        let wanted = fold_key(key);
        self.fields
            .iter()
            .copied()
            .find(|field| fold_key(field) == wanted)
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.contains(&field)
    }

    pub fn columns(&self) -> Vec<&'static str> {
        std::iter::once(self.id_column)
            .chain(self.fields.iter().copied())
            .collect()
    }
}

/// Lowercased key with underscores removed, used for loose key comparison.
pub fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

pub const CUSTOMER: EntitySpec = EntitySpec {
    table: "Customer",
    label: "Customer",
    id_column: "CustomerId",
    fields: &[
        "FirstName",
        "LastName",
        "Company",
        "Address",
        "City",
        "State",
        "Country",
        "PostalCode",
        "Phone",
        "Fax",
        "Email",
        "SupportRepId",
    ],
    required: &["FirstName", "LastName", "Email"],
};

pub const INVOICE: EntitySpec = EntitySpec {
    table: "Invoice",
    label: "Invoice",
    id_column: "InvoiceId",
    fields: &[
        "CustomerId",
        "InvoiceDate",
        "BillingAddress",
        "BillingCity",
        "BillingState",
        "BillingCountry",
        "BillingPostalCode",
        "Total",
    ],
    required: &["CustomerId", "InvoiceDate", "Total"],
};

pub const INVOICE_LINE: EntitySpec = EntitySpec {
    table: "InvoiceLine",
    label: "Invoice line",
    id_column: "InvoiceLineId",
    fields: &["InvoiceId", "TrackId", "UnitPrice", "Quantity"],
    required: &["InvoiceId", "TrackId", "UnitPrice", "Quantity"],
};

pub const EMPLOYEE: EntitySpec = EntitySpec {
    table: "Employee",
    label: "Employee",
    id_column: "EmployeeId",
    fields: &[
        "LastName",
        "FirstName",
        "Title",
        "ReportsTo",
        "BirthDate",
        "HireDate",
        "Address",
        "City",
        "State",
        "Country",
        "PostalCode",
        "Phone",
        "Fax",
        "Email",
    ],
    required: &["LastName", "FirstName"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_is_loose() {
        assert_eq!(CUSTOMER.field("FirstName"), Some("FirstName"));
        assert_eq!(CUSTOMER.field("firstName"), Some("FirstName"));
        assert_eq!(CUSTOMER.field("first_name"), Some("FirstName"));
        assert_eq!(CUSTOMER.field("CustomerId"), None);
        assert_eq!(CUSTOMER.field("Password"), None);
    }

    #[test]
    fn test_columns_start_with_id() {
        let columns = INVOICE_LINE.columns();
        assert_eq!(columns[0], "InvoiceLineId");
        assert_eq!(columns.len(), 5);
    }
}
