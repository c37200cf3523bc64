//! Statements the client sends to the query endpoint

/// Column selector that matches every column
pub const WILDCARD: &str = "*";

/// Double-quote an identifier so names with spaces, dots or keywords survive
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Whether a column selector is the wildcard
pub fn is_wildcard(column: &str) -> bool {
    column.trim() == WILDCARD
}

/// `SELECT <column> FROM <measurement>`; the wildcard is passed through unquoted
pub fn select(column: &str, measurement: &str) -> String {
    let column = if is_wildcard(column) {
        WILDCARD.to_string()
    } else {
        quote_ident(column)
    };
    format!("SELECT {} FROM {}", column, quote_ident(measurement))
}

pub fn show_databases() -> String {
    "SHOW DATABASES".to_string()
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_ident(name))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE {}", quote_ident(name))
}
