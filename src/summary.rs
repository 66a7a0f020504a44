//! Renders the portfolio snapshot as a terminal table.

use crate::quotes::QuoteOutcome;
use crate::registry::AssetRegistry;
use crate::ui;
use crate::valuation::PortfolioSnapshot;
use comfy_table::Cell;

pub fn display_snapshot(
    snapshot: &PortfolioSnapshot,
    outcomes: &[QuoteOutcome],
    registry: &AssetRegistry,
) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Quantity"),
        ui::header_cell("Price (EUR)"),
        ui::header_cell("Value (EUR)"),
        ui::header_cell("Deployed (EUR)"),
    ]);

    for valuation in &snapshot.assets {
        let name = registry
            .get(&valuation.asset_id)
            .map_or(valuation.asset_id.as_str(), |a| a.name.as_str());
        let missing_price = outcomes
            .iter()
            .any(|o| o.asset_id == valuation.asset_id && o.price_eur.is_none());

        let price_cell = if missing_price {
            ui::na_cell(true)
        } else {
            ui::value_cell(format!("{:.2}", valuation.current_price_eur))
        };

        table.add_row(vec![
            Cell::new(name),
            ui::value_cell(format!("{:.4}", valuation.position.quantity_held)),
            price_cell,
            ui::value_cell(format!("{:.2}", valuation.current_value_eur)),
            ui::value_cell(format!("{:.2}", valuation.position.deployed_capital_eur)),
        ]);
    }

    let totals = &snapshot.totals;
    let mut output = format!(
        "Portfolio: {}\n\n{}",
        ui::style_text("Overview", ui::StyleType::Title),
        table
    );

    output.push_str(&format!(
        "\n\nDeployed ({}): {}  Value: {}  Profit: {} ({:.2}%)",
        ui::style_text("EUR", ui::StyleType::TotalLabel),
        format!("{:.2}", totals.deployed_capital_eur),
        ui::style_text(&format!("{:.2}", totals.current_value_eur), ui::StyleType::TotalValue),
        format!("{:+.2}", totals.profit_eur),
        totals.return_pct * 100.0
    ));

    let notices: Vec<&QuoteOutcome> = outcomes.iter().filter(|o| o.notice.is_some()).collect();
    if !notices.is_empty() {
        output.push('\n');
        for outcome in notices {
            let reason = outcome.notice.as_deref().unwrap_or("unavailable");
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&format!("! {}: {}", outcome.asset_id, reason), ui::StyleType::Error)
            ));
        }
    }

    output
}

pub fn display_transactions(
    transactions: &[crate::store::Transaction],
    registry: &AssetRegistry,
) -> String {
    if transactions.is_empty() {
        return ui::style_text("No transactions yet.", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Asset"),
        ui::header_cell("Date"),
        ui::header_cell("Quantity"),
        ui::header_cell("Unit price (EUR)"),
    ]);

    for tx in transactions {
        let name = registry
            .get(&tx.asset_id)
            .map_or(tx.asset_id.as_str(), |a| a.name.as_str());
        let date = chrono::DateTime::from_timestamp_millis(tx.timestamp)
            .map_or_else(|| "?".to_string(), |dt| dt.format("%Y-%m-%d").to_string());
        table.add_row(vec![
            Cell::new(&tx.id),
            Cell::new(name),
            Cell::new(date),
            ui::value_cell(format!("{:.4}", tx.quantity)),
            ui::value_cell(format!("{:.2}", tx.price_per_unit_eur)),
        ]);
    }

    table.to_string()
}
