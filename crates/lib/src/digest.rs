//! Daily deal digest: formats the spreadsheet-side deal list into one push
//! message for the configured recipient. Pure string templating.

use serde::Deserialize;

/// One deal row as sent by the spreadsheet side. Fields beyond these three
/// are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Deal {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("-")
}

/// Build the digest text: dated header, then one numbered block per deal.
/// Returns `None` for an empty list so the caller can skip the push entirely.
pub fn format_digest(deals: &[Deal]) -> Option<String> {
    if deals.is_empty() {
        return None;
    }
    let today = chrono::Local::now().format("%Y-%m-%d");
    let mut out = format!("【本日の案件一覧】{} 全{}件\n", today, deals.len());
    for (i, deal) in deals.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("{}. {}\n", i + 1, field(&deal.overview)));
        out.push_str(&format!("   場所: {}\n", field(&deal.location)));
        out.push_str(&format!("   金額: {}\n", field(&deal.amount)));
    }
    Some(out)
}
