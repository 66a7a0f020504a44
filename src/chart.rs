//! Renders the daily deployed-vs-value series as a terminal table.

use crate::series::ChartPoint;
use crate::ui;
use comfy_table::Cell;

pub fn display_series(points: &[ChartPoint]) -> String {
    if points.is_empty() {
        return ui::style_text("No transactions yet.", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Day"),
        ui::header_cell("Deployed (EUR)"),
        ui::header_cell("Value (EUR)"),
        ui::header_cell("P/L (EUR)"),
        ui::header_cell(""),
    ]);

    for point in points {
        let profit = point.current_eur - point.deployed_eur;
        let marker = if point.deposit { "●" } else { "" };
        table.add_row(vec![
            Cell::new(point.day.to_string()),
            ui::value_cell(format!("{:.2}", point.deployed_eur)),
            ui::value_cell(format!("{:.2}", point.current_eur)),
            ui::change_cell(profit, format!("{profit:+.2}")),
            Cell::new(marker),
        ]);
    }

    let last = &points[points.len() - 1];
    let profit = last.current_eur - last.deployed_eur;
    format!(
        "{}\n\n{}\n\nToday: deployed {} value {} ({})\n{}",
        ui::style_text("Portfolio history", ui::StyleType::Title),
        table,
        format!("{:.2}", last.deployed_eur),
        ui::style_text(&format!("{:.2}", last.current_eur), ui::StyleType::TotalValue),
        format!("{profit:+.2}"),
        ui::style_text("● marks days with deposits", ui::StyleType::Subtle)
    )
}
