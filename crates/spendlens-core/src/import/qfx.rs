//! QFX / OFX statements
//!
//! OFX 1.x is SGML where closing tags are optional, OFX 2.x is XML. Both are
//! read the same way: split on `<STMTTRN>` and pull `<TAG>value` pairs out
//! of each block.

use regex::Regex;
use tracing::debug;

use super::parse_amount;
use crate::error::Result;
use crate::models::RawTransaction;

pub fn parse_qfx(text: &str) -> Result<Vec<RawTransaction>> {
    let block_start = Regex::new(r"(?i)<STMTTRN>")?;
    let block_end = Regex::new(r"(?i)</STMTTRN>|</BANKTRANLIST>")?;
    let field = Regex::new(r"(?i)<([A-Z0-9.]+)>([^<\r\n]*)")?;

    let mut transactions = Vec::new();

    for chunk in block_start.split(text).skip(1) {
        let block = match block_end.find(chunk) {
            Some(m) => &chunk[..m.start()],
            None => chunk,
        };

        let mut tx = RawTransaction::default();
        let mut name = String::new();

        for cap in field.captures_iter(block) {
            let value = cap[2].trim();
            match cap[1].to_uppercase().as_str() {
                "DTPOSTED" => tx.date = ofx_date(value),
                "TRNAMT" => tx.amount = parse_amount(value).unwrap_or(0.0),
                "NAME" => name = value.to_string(),
                "MEMO" => tx.notes = value.to_string(),
                "CATEGORY" => tx.original_category = value.to_string(),
                "FITID" if !value.is_empty() => tx.orig_id = Some(value.to_string()),
                _ => {}
            }
        }

        tx.description = if name.is_empty() {
            tx.notes.clone()
        } else {
            name
        };
        transactions.push(tx);
    }

    debug!("Parsed {} QFX transactions", transactions.len());
    Ok(transactions)
}

/// `YYYYMMDD[HHMMSS[.XXX][TZ]]` -> `YYYY-MM-DD`; other text is kept as-is
fn ofx_date(value: &str) -> String {
    match value.get(..8) {
        Some(d) if d.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}-{}-{}", &d[..4], &d[4..6], &d[6..8])
        }
        _ => value.to_string(),
    }
}
