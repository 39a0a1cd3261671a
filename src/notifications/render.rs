//! HTML rendering for the top products report email. Plain string building;
//! the layout mirrors what owners previously received, so it stays a simple
//! inline-styled table.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::services::reports::TopProductRow;

pub fn top_products_subject(start: NaiveDate, end: NaiveDate) -> String {
    format!("Top Products Report: {} to {}", start, end)
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const CELL_STYLE: &str = "padding: 10px; border: 1px solid #ddd;";
const HEADER_STYLE: &str =
    "padding: 12px; text-align: left; border: 1px solid #ddd; font-weight: bold;";

pub fn render_top_products_email(
    tenant_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    rows: &[TopProductRow],
    sender_name: &str,
) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head><title>Top Products Report</title></head>\n");
    html.push_str(
        "<body style=\"font-family: Arial, sans-serif; line-height: 1.6; color: #333;\">\n",
    );
    html.push_str(
        "<h1 style=\"color: #333; border-bottom: 2px solid #f0f0f0; padding-bottom: 10px;\">Top Products Report</h1>\n",
    );
    html.push_str(&format!(
        "<p><strong>Tenant:</strong> {}<br><strong>Period:</strong> {} to {}</p>\n",
        escape_html(tenant_name),
        start,
        end
    ));

    if rows.is_empty() {
        html.push_str(
            "<p style=\"color: #666; font-style: italic;\">No product sales data available for this period.</p>\n",
        );
    } else {
        html.push_str(
            "<table style=\"width: 100%; border-collapse: collapse; margin: 20px 0; border: 1px solid #ddd;\">\n<thead>\n<tr style=\"background-color: #f8f9fa;\">\n",
        );
        for heading in ["Product", "SKU", "Quantity Sold", "Revenue", "Avg Price"] {
            html.push_str(&format!("<th style=\"{}\">{}</th>\n", HEADER_STYLE, heading));
        }
        html.push_str("</tr>\n</thead>\n<tbody>\n");

        for (index, row) in rows.iter().enumerate() {
            let background = if index % 2 == 1 { "#f9f9f9" } else { "#ffffff" };
            html.push_str(&format!("<tr style=\"background-color: {};\">\n", background));
            html.push_str(&format!(
                "<td style=\"{}\">{}</td>\n",
                CELL_STYLE,
                escape_html(&row.name)
            ));
            html.push_str(&format!(
                "<td style=\"{}\">{}</td>\n",
                CELL_STYLE,
                escape_html(&row.sku)
            ));
            html.push_str(&format!(
                "<td style=\"{} text-align: right;\">{}</td>\n",
                CELL_STYLE, row.total_quantity
            ));
            html.push_str(&format!(
                "<td style=\"{} text-align: right;\">${:.2}</td>\n",
                CELL_STYLE, row.total_revenue
            ));
            html.push_str(&format!(
                "<td style=\"{} text-align: right;\">${:.2}</td>\n",
                CELL_STYLE, row.average_price
            ));
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n");

        let total_revenue: Decimal = rows.iter().map(|r| r.total_revenue).sum();
        let total_quantity: i64 = rows.iter().map(|r| r.total_quantity).sum();
        html.push_str(&format!(
            "<p style=\"margin-top: 20px;\"><strong>Total Revenue:</strong> ${:.2}<br><strong>Total Quantity Sold:</strong> {}</p>\n",
            total_revenue, total_quantity
        ));
    }

    html.push_str(&format!(
        "<p style=\"margin-top: 30px; padding-top: 15px; border-top: 1px solid #eee;\">Thanks,<br><strong>{}</strong></p>\n",
        escape_html(sender_name)
    ));
    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn rows() -> Vec<TopProductRow> {
        vec![
            TopProductRow {
                id: Uuid::new_v4(),
                name: "Espresso Beans".to_string(),
                sku: "SKU-001".to_string(),
                total_quantity: 12,
                total_revenue: dec!(600.00),
                average_price: dec!(50.00),
            },
            TopProductRow {
                id: Uuid::new_v4(),
                name: "Filter Papers".to_string(),
                sku: "SKU-002".to_string(),
                total_quantity: 9,
                total_revenue: dec!(225.00),
                average_price: dec!(25.00),
            },
        ]
    }

    #[test]
    fn subject_names_the_period() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        assert_eq!(
            top_products_subject(start, end),
            "Top Products Report: 2025-01-01 to 2025-01-31"
        );
    }

    #[test]
    fn body_contains_rows_and_footer_totals() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let html = render_top_products_email("Acme Coffee", start, end, &rows(), "Sales Reports");

        assert!(html.contains("Espresso Beans"));
        assert!(html.contains("SKU-002"));
        assert!(html.contains("$600.00"));
        assert!(html.contains("Total Revenue:</strong> $825.00"));
        assert!(html.contains("Total Quantity Sold:</strong> 21"));
    }

    #[test]
    fn empty_report_renders_the_no_data_message() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let html = render_top_products_email("Acme Coffee", start, end, &[], "Sales Reports");

        assert!(html.contains("No product sales data available for this period."));
        assert!(!html.contains("<table"));
    }

    #[test]
    fn markup_in_names_is_escaped() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        let mut row = rows().remove(0);
        row.name = "<script>alert('x')</script>".to_string();
        let html = render_top_products_email("Acme", start, end, &[row], "Sales Reports");

        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }
}
