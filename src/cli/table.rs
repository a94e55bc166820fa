//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Two-column table for key/value detail views.
pub fn detail_table(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(format!("{key}:")), Cell::new(value)]);
    }
    table
}

/// Render the table with a count header.
pub fn render_list(entity_name: &str, table: &Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let noun = if total == 1 {
        entity_name.to_string()
    } else {
        format!("{entity_name}s")
    };
    format!("{total} {noun}:\n{table}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_list() {
        let table = list_table(&["role", "limit"]);
        assert_eq!(render_list("role", &table, 0), "No roles found.");
    }

    #[test]
    fn test_render_list_includes_headers_and_rows() {
        let mut table = list_table(&["role", "limit"]);
        table.add_row(vec!["billing", "4"]);
        let rendered = render_list("role", &table, 1);
        assert!(rendered.starts_with("1 role:"));
        assert!(rendered.contains("ROLE"));
        assert!(rendered.contains("billing"));
    }

    #[test]
    fn test_detail_table_rows() {
        let rendered = detail_table(&[("Category", "billing".to_string())]).to_string();
        assert!(rendered.contains("Category:"));
        assert!(rendered.contains("billing"));
    }
}
