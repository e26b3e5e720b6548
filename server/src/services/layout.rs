//! Seat layout generation and seat-number ordering.

use serde::Deserialize;

use crate::models::{NewSeat, SeatType};
use crate::utils::AppError;

/// Row letters run A..=Z.
pub const MAX_ROWS: u32 = 26;
pub const MAX_SEATS_PER_ROW: u32 = 100;

/// Rectangular seat grid. Rows are numbered from 1 (row letter `A`);
/// rows listed in `premium_rows` win over `vip_rows`, everything else is
/// regular.
#[derive(Debug, Clone, Deserialize)]
pub struct SeatLayout {
    pub rows: u32,
    pub seats_per_row: u32,
    #[serde(default)]
    pub vip_rows: Vec<u32>,
    #[serde(default)]
    pub premium_rows: Vec<u32>,
}

impl Default for SeatLayout {
    fn default() -> Self {
        Self {
            rows: 10,
            seats_per_row: 8,
            vip_rows: vec![7, 8],
            premium_rows: vec![9, 10],
        }
    }
}

impl SeatLayout {
    /// `None` when the grid does not fit in a `u32`.
    pub fn capacity(&self) -> Option<u32> {
        self.rows.checked_mul(self.seats_per_row)
    }

    pub fn seat_type(&self, row: u32) -> SeatType {
        if self.premium_rows.contains(&row) {
            SeatType::Premium
        } else if self.vip_rows.contains(&row) {
            SeatType::Vip
        } else {
            SeatType::Regular
        }
    }

    /// Generates the seats for a theater of `capacity` seats.
    pub fn generate(&self, capacity: u32) -> Result<Vec<NewSeat>, AppError> {
        if self.rows == 0 || self.seats_per_row == 0 {
            return Err(AppError::ValidationError(
                "Layout needs at least one row and one seat per row".to_string(),
            ));
        }
        if self.rows > MAX_ROWS {
            return Err(AppError::ValidationError(format!(
                "Layout supports at most {MAX_ROWS} rows"
            )));
        }
        if self.seats_per_row > MAX_SEATS_PER_ROW {
            return Err(AppError::ValidationError(format!(
                "Layout supports at most {MAX_SEATS_PER_ROW} seats per row"
            )));
        }
        if self.capacity() != Some(capacity) {
            return Err(AppError::ValidationError(
                "Total seats configuration does not match theater capacity".to_string(),
            ));
        }

        let mut seats = Vec::with_capacity(capacity as usize);
        for row in 1..=self.rows {
            let letter = row_letter(row);
            for column in 1..=self.seats_per_row {
                seats.push(NewSeat {
                    seat_number: format!("{letter}{column}"),
                    seat_type: self.seat_type(row),
                });
            }
        }
        Ok(seats)
    }
}

fn row_letter(row: u32) -> char {
    char::from_u32('A' as u32 + row - 1).unwrap_or('?')
}

/// Sort key that orders `A2` before `A10`.
pub fn seat_sort_key(seat_number: &str) -> (String, u32) {
    let split = seat_number
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(seat_number.len());
    let (row, column) = seat_number.split_at(split);
    (row.to_string(), column.parse().unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let seats = SeatLayout::default().generate(80).unwrap();
        assert_eq!(seats.len(), 80);
        assert_eq!(seats[0].seat_number, "A1");
        assert_eq!(seats[0].seat_type, SeatType::Regular);
        assert_eq!(seats[79].seat_number, "J8");
        assert_eq!(seats[79].seat_type, SeatType::Premium);

        let g1 = seats.iter().find(|s| s.seat_number == "G1").unwrap();
        assert_eq!(g1.seat_type, SeatType::Vip);
        let f8 = seats.iter().find(|s| s.seat_number == "F8").unwrap();
        assert_eq!(f8.seat_type, SeatType::Regular);
    }

    #[test]
    fn test_capacity_must_match() {
        assert!(SeatLayout::default().generate(100).is_err());
    }

    #[test]
    fn test_too_many_rows() {
        let layout = SeatLayout {
            rows: 27,
            seats_per_row: 1,
            ..SeatLayout::default()
        };
        assert!(layout.generate(27).is_err());
    }

    #[test]
    fn test_oversized_rows_are_rejected() {
        let layout = SeatLayout {
            rows: 2,
            seats_per_row: u32::MAX / 2 + 1,
            ..SeatLayout::default()
        };
        assert_eq!(layout.capacity(), None);
        assert!(matches!(
            layout.generate(8),
            Err(AppError::ValidationError(_))
        ));

        let wide = SeatLayout {
            rows: 1,
            seats_per_row: MAX_SEATS_PER_ROW + 1,
            ..SeatLayout::default()
        };
        assert!(matches!(
            wide.generate(MAX_SEATS_PER_ROW + 1),
            Err(AppError::ValidationError(_))
        ));

        let largest = SeatLayout {
            rows: MAX_ROWS,
            seats_per_row: MAX_SEATS_PER_ROW,
            vip_rows: Vec::new(),
            premium_rows: Vec::new(),
        };
        assert_eq!(largest.generate(MAX_ROWS * MAX_SEATS_PER_ROW).unwrap().len(), 2600);
    }

    #[test]
    fn test_sort_key_is_numeric_within_row() {
        let mut numbers = vec!["A10", "B1", "A2", "A1"];
        numbers.sort_by_key(|n| seat_sort_key(n));
        assert_eq!(numbers, ["A1", "A2", "A10", "B1"]);
    }
}
