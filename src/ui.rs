use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

use crate::core::{CurrencyPair, RangeResult};
use crate::core::rate::DATE_FORMAT;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Renders a history as a titled two column table.
pub fn history_table(pair: &CurrencyPair, rates: &RangeResult) -> String {
    let mut table = new_styled_table();
    table.set_header(vec![header_cell("Date"), header_cell("Rate")]);

    for rate in rates {
        table.add_row(vec![
            Cell::new(rate.date.format(DATE_FORMAT)),
            Cell::new(format!("{:.6}", rate.value)).set_alignment(CellAlignment::Right),
        ]);
    }

    let mut output = format!(
        "History: {}\n\n",
        style_text(&pair.to_string(), StyleType::Title)
    );
    output.push_str(&table.to_string());
    let days = match rates.len() {
        1 => "1 day".to_string(),
        n => format!("{n} days"),
    };
    output.push_str(&format!("\n{}", style_text(&days, StyleType::Subtle)));
    output
}
