//! Shaping `Range.Value` results into rows.

use excel_com_protocol::CellValue;

/// Rows for a `Range.Value` that came back as a scalar.
///
/// A one-cell used range yields its value as a 1x1 grid. An empty sheet's
/// used range is a single blank cell and yields no rows at all.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn scalar_rows(value: CellValue) -> Vec<Vec<CellValue>> {
    match value {
        CellValue::Null => Vec::new(),
        value => vec![vec![value]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_used_range_has_no_rows() {
        assert!(scalar_rows(CellValue::Null).is_empty());
    }

    #[test]
    fn test_single_cell_used_range() {
        assert_eq!(
            scalar_rows(CellValue::Number(7.0)),
            vec![vec![CellValue::Number(7.0)]]
        );
    }
}
