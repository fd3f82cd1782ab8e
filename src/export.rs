//! CSV rendering for lineage export rows.

use crate::model::ExportRecord;

const HEADER: [&str; 5] = [
    "title",
    "repost_url",
    "parent_url",
    "repost_level",
    "published_at",
];

pub fn render_csv(records: &[ExportRecord]) -> String {
    let mut out = String::new();
    write_row(&mut out, &HEADER.map(str::to_string));
    for rec in records {
        write_row(
            &mut out,
            &[
                rec.title.clone().unwrap_or_default(),
                rec.repost_url.clone(),
                rec.parent_url.clone(),
                rec.repost_level.to_string(),
                rec.published_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            ],
        );
    }
    out
}

fn write_row(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field));
    }
    out.push('\n');
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_header_and_blank_published_at() {
        let records = vec![ExportRecord {
            title: None,
            repost_url: "https://mirror.example/copy".into(),
            parent_url: "https://origin.example/post".into(),
            repost_level: 2,
            published_at: None,
        }];
        let csv = render_csv(&records);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "title,repost_url,parent_url,repost_level,published_at"
        );
        assert_eq!(
            lines.next().unwrap(),
            ",https://mirror.example/copy,https://origin.example/post,2,"
        );
    }

    #[test]
    fn escapes_fields_with_separators() {
        let records = vec![ExportRecord {
            title: Some("breaking, \"quoted\"".into()),
            repost_url: "https://mirror.example/copy".into(),
            parent_url: "https://origin.example/post".into(),
            repost_level: 2,
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        }];
        let csv = render_csv(&records);
        assert!(csv.contains("\"breaking, \"\"quoted\"\"\""));
        assert!(csv.contains("2024-05-01T12:00:00+00:00"));
    }
}
