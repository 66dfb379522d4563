// 📊 Chart data - doughnut slices, line points, colours, money formatting
//
// Pure shaping of already-aggregated numbers; rendering is left to the
// front-end (terminal widgets or the JSON API consumer).

use chrono::NaiveDate;
use serde::Serialize;

pub const PALETTE: [&str; 10] = [
    "#22d3ee", "#f43f5e", "#10b981", "#f59e0b", "#6366f1", "#84cc16", "#eab308", "#a78bfa",
    "#06b6d4", "#ef4444",
];

/// Deterministic palette colour for a name without a stored colour.
/// Hash is `h = h * 31 + unit` over UTF-16 code units, wrapping at 32 bits.
pub fn fallback_color(name: &str) -> &'static str {
    let hash = name
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)));
    PALETTE[(hash % PALETTE.len() as u32) as usize]
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_money(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}

// ============================================================================
// DOUGHNUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Doughnut {
    pub slices: Vec<Slice>,
    pub total: f64,
}

impl Doughnut {
    /// Sum values per name, keeping first-seen order. Labels carry the
    /// share of the total with one decimal.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut sums: Vec<(String, f64)> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            match sums.iter_mut().find(|(n, _)| *n == name) {
                Some((_, sum)) => *sum += value,
                None => sums.push((name, value)),
            }
        }

        let total: f64 = sums.iter().map(|(_, v)| v).sum();
        let slices = sums
            .into_iter()
            .enumerate()
            .map(|(i, (name, value))| Slice {
                label: percent_label(&name, value, total),
                color: PALETTE[i % PALETTE.len()],
                name,
                value,
            })
            .collect();

        Self { slices, total }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

fn percent_label(name: &str, value: f64, total: f64) -> String {
    if total == 0.0 {
        format!("{} 0%", name)
    } else {
        format!("{} {:.1}%", name, value / total * 100.0)
    }
}

// ============================================================================
// LINE SERIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: NaiveDate,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

/// Points sorted by date with y rounded to cents
pub fn to_points<I>(values: I) -> Vec<Point>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    let mut points: Vec<Point> = values
        .into_iter()
        .map(|(x, y)| Point { x, y: round2(y) })
        .collect();
    points.sort_by_key(|p| p.x);
    points
}

/// Axis unit from the span of the (sorted) points
pub fn pick_unit(points: &[Point]) -> TimeUnit {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return TimeUnit::Day;
    };
    let weeks = (last.x - first.x).num_days() as f64 / 7.0;
    if weeks > 20.0 {
        TimeUnit::Month
    } else if weeks > 3.0 {
        TimeUnit::Week
    } else {
        TimeUnit::Day
    }
}

pub fn series_total(points: &[Point]) -> f64 {
    points.iter().map(|p| p.y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_doughnut_percent_labels_and_palette_order() {
        let chart = Doughnut::from_pairs(vec![("Food", 30.0), ("Fuel", 10.0), ("Food", 10.0)]);
        assert_eq!(chart.total, 50.0);
        assert_eq!(chart.slices.len(), 2);
        assert_eq!(chart.slices[0].label, "Food 80.0%");
        assert_eq!(chart.slices[1].label, "Fuel 20.0%");
        assert_eq!(chart.slices[0].color, PALETTE[0]);
        assert_eq!(chart.slices[1].color, PALETTE[1]);
    }

    #[test]
    fn test_doughnut_zero_total() {
        let chart = Doughnut::from_pairs(vec![("Refund", 0.0)]);
        assert_eq!(chart.slices[0].label, "Refund 0%");
        assert!(Doughnut::from_pairs(Vec::<(String, f64)>::new()).is_empty());
    }

    #[test]
    fn test_fallback_color_is_deterministic() {
        // "a" = 97 -> 97 % 10 = 7
        assert_eq!(fallback_color("a"), PALETTE[7]);
        // "ab" = 97 * 31 + 98 = 3105 -> 5
        assert_eq!(fallback_color("ab"), PALETTE[5]);
        assert_eq!(fallback_color(""), PALETTE[0]);
        assert_eq!(fallback_color("Groceries"), fallback_color("Groceries"));
    }

    #[test]
    fn test_points_sorted_and_rounded() {
        let points = to_points(vec![(d(2025, 1, 3), 1.005), (d(2025, 1, 1), 2.333)]);
        assert_eq!(points[0].x, d(2025, 1, 1));
        assert_eq!(points[0].y, 2.33);
        assert_eq!(series_total(&points), points[0].y + points[1].y);
    }

    #[test]
    fn test_pick_unit_from_span() {
        let span = |days: i64| {
            to_points(vec![
                (d(2025, 1, 1), 1.0),
                (crate::buckets::add_days(d(2025, 1, 1), days), 1.0),
            ])
        };
        assert_eq!(pick_unit(&[]), TimeUnit::Day);
        assert_eq!(pick_unit(&span(21)), TimeUnit::Day);
        assert_eq!(pick_unit(&span(29)), TimeUnit::Week);
        assert_eq!(pick_unit(&span(150)), TimeUnit::Month);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(12.5, "PLN"), "12.50 PLN");
    }
}
