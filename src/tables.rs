use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};

use crate::core::{Account, Readings, UsageSample};

fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.enforce_styling();
    table
}

pub fn build_readings_table(readings: &Readings) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Account", "Total", "Raw", "Cost"]);
    for (account_id, reading) in readings {
        table.add_row(vec![
            Cell::new(account_id),
            Cell::new(reading.total)
                .set_alignment(CellAlignment::Right)
                .fg(if reading.total > reading.raw { Color::DarkYellow } else { Color::Reset }),
            Cell::new(reading.raw).set_alignment(CellAlignment::Right).add_attribute(Attribute::Dim),
            Cell::new(reading.cost).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_accounts_table(accounts: &[Account]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Account", "GIS ID", "Nickname", "Status", "Address"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(&account.id),
            Cell::new(account.gis_id.map(|gis_id| gis_id.to_string()).unwrap_or_default())
                .set_alignment(CellAlignment::Right),
            Cell::new(account.nickname.as_deref().unwrap_or_default()),
            Cell::new(account.status.as_deref().unwrap_or_default()).fg(
                match account.status.as_deref() {
                    Some("ACTIVE") => Color::Green,
                    Some(_) => Color::DarkYellow,
                    None => Color::Reset,
                },
            ),
            Cell::new(account.address.as_deref().unwrap_or_default())
                .add_attribute(Attribute::Dim),
        ]);
    }
    table
}

pub fn build_samples_table(samples: &[(&Account, UsageSample)]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Account", "Month-to-date", "Cost", "Latest day", "Day cost"]);
    for (account, sample) in samples {
        table.add_row(vec![
            Cell::new(&account.id),
            Cell::new(sample.kwh).set_alignment(CellAlignment::Right),
            Cell::new(sample.cost).set_alignment(CellAlignment::Right),
            Cell::new(sample.daily_kwh).set_alignment(CellAlignment::Right),
            Cell::new(sample.daily_cost).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
