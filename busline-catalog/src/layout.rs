//! Seat numbering <-> grid placement.
//!
//! A seat number is a floor prefix followed by a 1-based sequential order
//! (`A01`, `B12`). The layout config says how many columns each floor has, so
//! the order maps to a row-major grid cell. Placement never fails: when the
//! config is missing or does not recognize the number, a fixed three-column
//! grid is assumed instead.

use busline_core::seat::normalize_seat_number;
use busline_core::{FloorLayout, SeatLayoutConfig};
use serde::{Deserialize, Serialize};

pub const FALLBACK_COLUMNS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SeatPosition {
    pub floor: u8,
    pub row: u32,
    pub col: u32,
    /// 1-based order of the seat within its floor
    pub display_index: u32,
}

/// Places a seat number on the grid described by `layout`.
pub fn resolve_position(seat_number: &str, layout: Option<&SeatLayoutConfig>) -> SeatPosition {
    let normalized = normalize_seat_number(seat_number);

    layout
        .and_then(|config| resolve_configured(&normalized, config))
        .unwrap_or_else(|| resolve_fallback(&normalized))
}

/// Seat numbers for a fresh layout, floors in config order, row-major within a floor.
pub fn generate_seat_numbers(layout: &SeatLayoutConfig) -> Vec<String> {
    generate_seat_plan(layout).into_iter().map(|(number, _)| number).collect()
}

/// Seat numbers together with the grid cell each one was generated for.
pub fn generate_seat_plan(layout: &SeatLayoutConfig) -> Vec<(String, SeatPosition)> {
    let mut plan = Vec::with_capacity(layout.capacity() as usize);

    for spec in &layout.floors {
        let prefix = spec.prefix.trim().to_ascii_uppercase();
        let columns = spec.columns.max(1);

        for order in 1..=spec.capacity() {
            plan.push((format!("{}{:02}", prefix, order), place(spec.floor, order, columns)));
        }
    }

    plan
}

fn resolve_configured(seat_number: &str, config: &SeatLayoutConfig) -> Option<SeatPosition> {
    // Longest prefix wins so "AB" beats "A" for "AB03".
    let (spec, prefix_len) = config
        .floors
        .iter()
        .filter_map(|spec| {
            let prefix = spec.prefix.trim().to_ascii_uppercase();
            (!prefix.is_empty() && seat_number.starts_with(&prefix)).then_some((spec, prefix.len()))
        })
        .max_by_key(|(_, len)| *len)?;

    let suffix = &seat_number[prefix_len..];
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some(place_on(spec, parse_order(suffix)))
}

fn resolve_fallback(seat_number: &str) -> SeatPosition {
    let floor = seat_number
        .bytes()
        .next()
        .filter(u8::is_ascii_uppercase)
        .map(|b| b - b'A' + 1)
        .unwrap_or(1);

    let digits_start = seat_number
        .bytes()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let digits = &seat_number[digits_start..];

    let order = if digits.is_empty() { 1 } else { parse_order(digits) };

    place(floor, order, FALLBACK_COLUMNS)
}

fn place_on(spec: &FloorLayout, order: u32) -> SeatPosition {
    place(spec.floor, order, spec.columns.max(1))
}

fn place(floor: u8, order: u32, columns: u32) -> SeatPosition {
    let index = order.max(1) - 1;
    SeatPosition {
        floor,
        row: index / columns + 1,
        col: index % columns + 1,
        display_index: order.max(1),
    }
}

/// Digits only. Overflow clamps, zero becomes the first seat.
fn parse_order(digits: &str) -> u32 {
    digits.parse::<u32>().unwrap_or(u32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn layout(floors: &[(u8, &str, u32, u32)]) -> SeatLayoutConfig {
        SeatLayoutConfig::new(
            Uuid::new_v4(),
            floors
                .iter()
                .map(|(floor, prefix, rows, columns)| FloorLayout {
                    floor: *floor,
                    prefix: prefix.to_string(),
                    rows: *rows,
                    columns: *columns,
                    label: None,
                })
                .collect(),
        )
    }

    #[test]
    fn test_two_by_two_layout() {
        let config = layout(&[(1, "A", 2, 2)]);

        assert_eq!(generate_seat_numbers(&config), vec!["A01", "A02", "A03", "A04"]);
        assert_eq!(
            resolve_position("A03", Some(&config)),
            SeatPosition { floor: 1, row: 2, col: 1, display_index: 3 }
        );
    }

    #[test]
    fn test_generated_numbers_resolve_to_their_cells() {
        let config = layout(&[(1, "A", 6, 4), (2, "B", 5, 3), (2, "AB", 2, 2)]);

        let plan = generate_seat_plan(&config);
        assert_eq!(plan.len(), 24 + 15 + 4);

        for (number, position) in plan {
            assert_eq!(resolve_position(&number, Some(&config)), position, "seat {}", number);
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let config = layout(&[(1, "A", 3, 3), (2, "AB", 3, 2)]);

        let position = resolve_position("ab03", Some(&config));
        assert_eq!(position.floor, 2);
        assert_eq!((position.row, position.col), (2, 1));

        let position = resolve_position("A03", Some(&config));
        assert_eq!(position.floor, 1);
        assert_eq!((position.row, position.col), (1, 3));
    }

    #[test]
    fn test_missing_layout_uses_three_columns() {
        let position = resolve_position("B05", None);
        assert_eq!(position, SeatPosition { floor: 2, row: 2, col: 2, display_index: 5 });
    }

    #[test]
    fn test_unknown_prefix_falls_back() {
        let config = layout(&[(1, "A", 2, 2)]);
        let position = resolve_position("C07", Some(&config));
        assert_eq!(position, SeatPosition { floor: 3, row: 3, col: 1, display_index: 7 });
    }

    #[test]
    fn test_fallback_never_fails_on_odd_input() {
        for raw in ["", "VIP", "12", "A00", "A-1", "Z99999999999999", "ghế 5"] {
            let position = resolve_position(raw, None);
            assert!(position.row >= 1 && position.col >= 1, "input {:?}", raw);
            assert!(position.col <= FALLBACK_COLUMNS);
        }

        assert_eq!(resolve_position("12", None).floor, 1);
        assert_eq!(resolve_position("A00", None).display_index, 1);
    }
}
