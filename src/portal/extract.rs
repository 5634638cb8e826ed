//! Record extraction and the pure normalization helpers around it.
//!
//! The page-level functions read the overview and treatment-plan iframes;
//! the pure functions (name reformatting, candidate matching, note
//! windowing) carry the behavior worth unit-testing without a browser.

use chrono::{Months, NaiveDate};
use chromiumoxide::Page;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dom::{eval_in_frame, wait_for_frame_selector, wait_for_selector};
use super::{CandidatePatient, PortalError, TreatmentRow};

pub const OVERVIEW_IFRAME: &str = "#AdvancedPatientOverviewIFrame";
const NOTES_BUTTON: &str = "#MenuBar_aImgTplanCTB_tbImg";
const NOTES_IFRAME: &str = "#AdvancedTreatPlanQuickEntryIFrame";
const NOTES_TABLE: &str = "#treatmentplan-data-table-body";

const NOTES_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw field values read from the patient overview iframe.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewData {
    pub patient_name: Option<String>,
    pub provider: Option<String>,
    pub last_visit: Option<String>,
}

/// Read name, provider, and last-visit from the overview iframe in one
/// evaluation. The provider field is recognized by professional title in
/// its tooltip; the last visit sits in the sibling of its text label.
pub async fn extract_overview(page: &Page) -> Result<OverviewData, PortalError> {
    let body = r#"
        const getText = (sel) => {
            const el = doc.querySelector(sel);
            return el && el.textContent ? el.textContent.trim() : null;
        };
        const spans = Array.from(doc.querySelectorAll('span'));
        const label = spans.find(el => (el.textContent || '').includes('Last Visit'));
        const sibling = label ? label.nextElementSibling : null;
        return {
            patientName: getText('.patient-name'),
            provider: getText('.label-inner-value[title*="DDS"], .label-inner-value[title*="DMD"]'),
            lastVisit: sibling && sibling.textContent ? sibling.textContent.trim() : null
        };
    "#;

    let data: Option<OverviewData> = eval_in_frame(page, OVERVIEW_IFRAME, body).await?;
    data.ok_or_else(|| PortalError::Extraction("patient overview iframe not reachable".into()))
}

/// Detect and dismiss the flash-alert popup that the overview sub-frame
/// sometimes raises over the record. Absence is the normal case; nothing
/// here is allowed to fail the lookup.
pub async fn dismiss_flash_alert(page: &Page) {
    let js = r#"(() => {
        const walk = (doc) => {
            if (!doc) { return null; }
            for (const frame of Array.from(doc.querySelectorAll('iframe'))) {
                let inner = null;
                try { inner = frame.contentDocument; } catch (e) { inner = null; }
                const src = frame.getAttribute('src') || '';
                if (src.includes('PatientOverview/Index') && inner) { return inner; }
                const nested = inner && walk(inner);
                if (nested) { return nested; }
            }
            return null;
        };
        const doc = walk(document);
        if (!doc) { return 'no-frame'; }
        if (!doc.querySelector('#falsh-alert')) { return 'no-alert'; }
        const primary = doc.querySelector('#btn-close-flash-alert-modal');
        if (primary) { primary.click(); return 'closed'; }
        const fallback = Array.from(doc.querySelectorAll('button'))
            .find(b => (b.textContent || '').trim().toUpperCase() === 'CLOSE');
        if (fallback) { fallback.click(); return 'closed-fallback'; }
        return 'stuck';
    })()"#;

    let status = match page.evaluate(js).await {
        Ok(result) => result
            .into_value::<String>()
            .unwrap_or_else(|_| "unknown".to_string()),
        Err(e) => {
            warn!("Flash alert check failed: {}", e);
            return;
        }
    };

    match status.as_str() {
        "no-frame" | "no-alert" => debug!("No flash alert popup found"),
        "closed" | "closed-fallback" => {
            info!("Flash alert popup closed ({})", status);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        other => warn!("Could not close flash alert popup: {}", other),
    }
}

/// Open the treatment-plan view and collect the note rows dated within
/// one month before the last visit, deduplicated.
pub async fn open_treatment_notes(
    page: &Page,
    last_visit: &str,
) -> Result<Vec<TreatmentRow>, PortalError> {
    wait_for_selector(page, NOTES_BUTTON, Duration::from_secs(5))
        .await?
        .click()
        .await?;

    wait_for_selector(page, NOTES_IFRAME, NOTES_TIMEOUT).await?;
    wait_for_frame_selector(page, NOTES_IFRAME, NOTES_TABLE, NOTES_TIMEOUT).await?;

    let body = r#"
        const rows = Array.from(doc.querySelectorAll('#treatmentplan-data-table-body tr'));
        return rows
            .map(row => {
                const dateLink = row.querySelector('a.diag-date');
                const descCell = row.querySelector('td.width-23.text-ellipsis');
                if (!dateLink || !descCell) { return null; }
                return {
                    date: (dateLink.textContent || '').trim(),
                    description: (descCell.textContent || '').trim()
                };
            })
            .filter(r => r !== null);
    "#;

    let rows: Option<Vec<TreatmentRow>> = eval_in_frame(page, NOTES_IFRAME, body).await?;
    let rows = rows
        .ok_or_else(|| PortalError::Extraction("treatment plan iframe not reachable".into()))?;

    let filtered = filter_treatment_rows(rows, last_visit);
    info!(
        "Found {} treatment note(s) within one month before {}",
        filtered.len(),
        last_visit
    );
    Ok(filtered)
}

/// Reformat "Last, First" display names to "First Last"; names without a
/// comma pass through untouched.
pub fn format_patient_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains(", ") {
        {
            let mut parts = trimmed.split(", ").collect::<Vec<_>>();
            parts.reverse();
            parts.join(" ")
        }
    } else {
        trimmed.to_string()
    }
}

/// Trim a scraped field, mapping empty to None.
pub fn clean_field(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pick the search-result row that belongs to the target patient: the
/// first row whose lowercased text contains first+last or last+first
/// concatenated. No scoring; table order breaks ties.
pub fn match_candidate<'a>(
    candidates: &'a [CandidatePatient],
    first_name: &str,
    last_name: &str,
) -> Option<&'a CandidatePatient> {
    let first = first_name.to_lowercase();
    let last = last_name.to_lowercase();
    let forward = format!("{first}{last}");
    let reverse = format!("{last}{first}");

    candidates.iter().find(|candidate| {
        let text = candidate.text.to_lowercase();
        text.contains(&forward) || text.contains(&reverse)
    })
}

/// Parse a portal date cell ("MM/DD/YYYY", optionally with a trailing
/// time-of-day, padded or not) to calendar-day granularity.
pub fn parse_portal_date(value: &str) -> Option<NaiveDate> {
    let token = value.trim().split_whitespace().next()?;
    let mut parts = token.split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year: i32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || year < 1000 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Keep rows dated within the inclusive window [last_visit - 1 month,
/// last_visit], deduplicated by exact (date, description) pair. Rows with
/// unparseable dates are dropped; an unparseable anchor yields nothing.
pub fn filter_treatment_rows(rows: Vec<TreatmentRow>, last_visit: &str) -> Vec<TreatmentRow> {
    let Some(anchor) = parse_portal_date(last_visit) else {
        warn!("Unparseable last-visit date: {}", last_visit);
        return Vec::new();
    };
    let start = anchor
        .checked_sub_months(Months::new(1))
        .unwrap_or(anchor);

    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            parse_portal_date(&row.date)
                .map(|d| d >= start && d <= anchor)
                .unwrap_or(false)
        })
        .filter(|row| seen.insert((row.date.clone(), row.description.clone())))
        .collect()
}
