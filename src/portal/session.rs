//! The end-to-end lookup workflow.
//!
//! Sequential steps against the portal UI: login, office selection, DOB
//! search, disambiguation, extraction. Every wait has a single bounded
//! timeout and no step is retried; whatever fails, the browser session
//! is closed before the result leaves this module.

use async_trait::async_trait;
use chromiumoxide::Page;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;

use super::browser::BrowserSession;
use super::dom::{
    click_in_frame, click_matching_text, eval_in_frame, frame_has_selector, selector_exists,
    wait_for_frame_selector, wait_for_selector,
};
use super::extract::{
    clean_field, dismiss_flash_alert, extract_overview, format_patient_name,
    match_candidate, open_treatment_notes, OVERVIEW_IFRAME,
};
use super::{CandidatePatient, LookupOutcome, PatientLookup, PatientRecord, PortalError};

const LOGIN_USERNAME_FIELD: &str = "#loginForm > form > div.form-group > input";
const LOGIN_BUTTON: &str = "#btnLogin";
const PASSWORD_FIELD: &str = r#"input[name="txtPassword"]"#;
const PASSWORD_SUBMIT: &str = "#aLogin";
const OFFICE_SEARCH: &str = "#officeSearchFullList";
const OFFICE_ENTRY: &str = "li.ui-menu-item";
const PATIENT_SEARCH: &str = "#MenuBar_txtSearchPat";
const PATIENT_SEARCH_GO: &str = "#MenuBar_imgSearchGo";
const SEARCH_IFRAME: &str = "#AdvancedSearchPatientsIFrame";
const RESULT_ROWS: &str = "#search-patients-data-table tr.search-patients-div-row";
const EMPTY_MARKER: &str = "td.dataTables_empty";

const POLL: Duration = Duration::from_millis(100);
const LOGIN_PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const FIELD_TIMEOUT: Duration = Duration::from_secs(2);
const OFFICE_TIMEOUT: Duration = Duration::from_secs(30);
const SEARCH_FIELD_TIMEOUT: Duration = Duration::from_secs(6);
/// Network-quiet wait after triggering the search; failure tolerated.
const NETWORK_QUIET_TIMEOUT: Duration = Duration::from_secs(2);
/// Fixed settle delay for iframe load after the search fires.
const RESULT_SETTLE: Duration = Duration::from_secs(3);
const FRAME_RACE_TIMEOUT: Duration = Duration::from_secs(2);
const RESULTS_TIMEOUT: Duration = Duration::from_secs(10);
const OVERVIEW_ATTACH_TIMEOUT: Duration = Duration::from_secs(10);
const OVERVIEW_FIELDS_TIMEOUT: Duration = Duration::from_secs(5);
const POST_EXTRACT_SETTLE: Duration = Duration::from_millis(500);

/// Search screens only ever expose a handful of rows worth considering.
const MAX_CANDIDATES: usize = 10;

/// Which result view the portal landed on after a DOB search.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SearchOutcome {
    MultipleResults,
    SingleResult,
}

/// Bound a CDP future with one timeout; elapsing is terminal.
async fn bounded<T, F>(future: F, timeout: Duration, what: &str) -> Result<T, PortalError>
where
    F: Future<Output = Result<T, chromiumoxide::error::CdpError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(PortalError::Timeout(what.to_string())),
    }
}

/// Drives portal lookups, one browser session per call, bounded by a
/// session permit so concurrent requests cannot fork unbounded Chromium
/// processes.
pub struct PortalClient {
    config: Arc<AppConfig>,
    permits: Arc<Semaphore>,
}

impl PortalClient {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_browser_sessions));
        Self { config, permits }
    }

    /// Authenticate with the fixed service account. Two submits: the
    /// username page navigates to a password page, which navigates into
    /// the application shell.
    async fn login(&self, page: &Page) -> Result<(), PortalError> {
        info!("Opening portal login page");
        bounded(
            page.goto(self.config.login_url.as_str()),
            LOGIN_PAGE_TIMEOUT,
            "login page",
        )
        .await?;

        let username = wait_for_selector(page, LOGIN_USERNAME_FIELD, FIELD_TIMEOUT).await?;
        username.click().await?;
        username.type_str(&self.config.username).await?;
        wait_for_selector(page, LOGIN_BUTTON, FIELD_TIMEOUT)
            .await?
            .click()
            .await?;
        bounded(
            page.wait_for_navigation(),
            self.config.navigation_timeout,
            "navigation after username submit",
        )
        .await?;

        let password = wait_for_selector(page, PASSWORD_FIELD, FIELD_TIMEOUT).await?;
        password.click().await?;
        password.type_str(&self.config.password).await?;
        wait_for_selector(page, PASSWORD_SUBMIT, FIELD_TIMEOUT)
            .await?
            .click()
            .await?;
        bounded(
            page.wait_for_navigation(),
            self.config.navigation_timeout,
            "navigation after login",
        )
        .await?;

        Ok(())
    }

    /// Type-ahead the office picker to the canonical label and click the
    /// matching entry. No fallback: a label the picker does not know is
    /// an error here, not later.
    async fn select_office(&self, page: &Page, branch: &str) -> Result<(), PortalError> {
        let label = branch.trim();
        info!("Selecting office '{}'", label);

        let picker = wait_for_selector(page, OFFICE_SEARCH, OFFICE_TIMEOUT).await?;
        picker.click().await?;
        picker.type_str(label).await?;

        let start = Instant::now();
        loop {
            if click_matching_text(page, OFFICE_ENTRY, label).await? {
                return Ok(());
            }
            if start.elapsed() >= OFFICE_TIMEOUT {
                return Err(PortalError::Timeout(format!("office entry '{label}'")));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Fill the patient search box with the DOB and fire the search.
    async fn search_by_dob(&self, page: &Page, dob: &str) -> Result<(), PortalError> {
        info!("Searching for patient by DOB");
        let search = wait_for_selector(page, PATIENT_SEARCH, SEARCH_FIELD_TIMEOUT).await?;
        search.click().await?;
        search.type_str(dob).await?;
        wait_for_selector(page, PATIENT_SEARCH_GO, FIELD_TIMEOUT)
            .await?
            .click()
            .await?;

        if bounded(page.wait_for_navigation(), NETWORK_QUIET_TIMEOUT, "network quiet")
            .await
            .is_err()
        {
            debug!("Network not fully idle after search");
        }
        tokio::time::sleep(RESULT_SETTLE).await;
        Ok(())
    }

    /// Decide which result view attached: the multi-result search table
    /// or the single-patient overview. The outcomes are mutually
    /// exclusive; neither appearing within the bound is an error, never
    /// a hang.
    async fn detect_result_frame(&self, page: &Page) -> Result<SearchOutcome, PortalError> {
        let start = Instant::now();
        loop {
            if selector_exists(page, SEARCH_IFRAME).await {
                return Ok(SearchOutcome::MultipleResults);
            }
            if selector_exists(page, OVERVIEW_IFRAME).await {
                return Ok(SearchOutcome::SingleResult);
            }
            if start.elapsed() >= FRAME_RACE_TIMEOUT {
                return Err(PortalError::Timeout(
                    "search results or patient overview iframe".to_string(),
                ));
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Work the multi-result table: an explicit empty marker is a valid
    /// negative answer; otherwise pick the target row and click it by
    /// its stable patient id. No plausible row is also a negative
    /// answer, never an undefined click.
    async fn disambiguate(
        &self,
        page: &Page,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<()>, PortalError> {
        info!("Multiple results frame present; reading search table");

        let start = Instant::now();
        let populated = loop {
            if frame_has_selector(page, SEARCH_IFRAME, RESULT_ROWS).await? {
                break true;
            }
            if frame_has_selector(page, SEARCH_IFRAME, EMPTY_MARKER).await? {
                break false;
            }
            if start.elapsed() >= RESULTS_TIMEOUT {
                return Err(PortalError::Timeout("search results table".to_string()));
            }
            tokio::time::sleep(POLL).await;
        };

        if !populated {
            info!("No matching records found");
            return Ok(None);
        }

        let candidates = self.collect_candidates(page).await?;
        info!("Found {} patient(s) in search results", candidates.len());

        let Some(candidate) = match_candidate(&candidates, first_name, last_name) else {
            info!("No search row matched '{} {}'", first_name, last_name);
            return Ok(None);
        };
        let patient_id = candidate.patient_id.as_deref().ok_or_else(|| {
            PortalError::Extraction("matched search row carries no patient id".to_string())
        })?;
        info!("Matched row {} (patient id {})", candidate.index, patient_id);

        let row_selector = format!(r#"tr.search-patients-div-row[patid="{patient_id}"]"#);
        if !click_in_frame(page, SEARCH_IFRAME, &row_selector).await? {
            return Err(PortalError::Extraction(format!(
                "search row for patient id {patient_id} disappeared before click"
            )));
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        wait_for_selector(page, OVERVIEW_IFRAME, OVERVIEW_ATTACH_TIMEOUT).await?;
        Ok(Some(()))
    }

    async fn collect_candidates(&self, page: &Page) -> Result<Vec<CandidatePatient>, PortalError> {
        let body = format!(
            r#"
            const rows = Array.from(doc.querySelectorAll(
                '#search-patients-data-table tr.search-patients-div-row'
            )).slice(0, {MAX_CANDIDATES});
            return rows.map((row, index) => ({{
                index,
                patientId: row.getAttribute('patid'),
                text: (row.textContent || '').trim().substring(0, 100)
            }}));
            "#
        );
        let candidates: Option<Vec<CandidatePatient>> =
            eval_in_frame(page, SEARCH_IFRAME, &body).await?;
        candidates
            .ok_or_else(|| PortalError::Extraction("search results iframe not reachable".into()))
    }

    /// Read the overview fields, clear any flash alert, and collect the
    /// windowed treatment notes.
    async fn extract_record(&self, page: &Page) -> Result<PatientRecord, PortalError> {
        wait_for_frame_selector(page, OVERVIEW_IFRAME, ".patient-name", OVERVIEW_FIELDS_TIMEOUT)
            .await?;

        let overview = extract_overview(page).await?;
        let raw_name = clean_field(overview.patient_name)
            .ok_or_else(|| PortalError::Extraction("patient name missing from overview".into()))?;
        info!("Patient overview loaded for {}", raw_name);

        tokio::time::sleep(POST_EXTRACT_SETTLE).await;
        dismiss_flash_alert(page).await;

        let provider = clean_field(overview.provider);
        let last_visit = clean_field(overview.last_visit);

        let treatment_rows = match &last_visit {
            Some(anchor) => open_treatment_notes(page, anchor).await?,
            None => {
                debug!("No last-visit date on record; skipping treatment notes");
                Vec::new()
            }
        };

        Ok(PatientRecord {
            patient_name: format_patient_name(&raw_name),
            provider,
            last_visit,
            treatment_rows,
        })
    }

    async fn run(
        &self,
        page: &Page,
        branch: &str,
        dob: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<LookupOutcome, PortalError> {
        self.login(page).await?;
        self.select_office(page, branch).await?;
        self.search_by_dob(page, dob).await?;

        match self.detect_result_frame(page).await? {
            SearchOutcome::MultipleResults => {
                match self.disambiguate(page, first_name, last_name).await? {
                    Some(()) => {}
                    None => return Ok(LookupOutcome::NotFound),
                }
            }
            SearchOutcome::SingleResult => {
                info!("Single patient found; extracting details");
            }
        }

        let record = self.extract_record(page).await?;
        Ok(LookupOutcome::Found(record))
    }
}

#[async_trait]
impl PatientLookup for PortalClient {
    async fn lookup_patient(
        &self,
        branch: &str,
        dob: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<LookupOutcome, PortalError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PortalError::Launch("session limiter closed".to_string()))?;

        let request_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "Lookup {} starting: office '{}', dob {}",
            request_id, branch, dob
        );

        let session = BrowserSession::launch(&self.config).await?;
        let result = self.run(&session.page, branch, dob, first_name, last_name).await;

        if let Err(e) = &result {
            error!("Lookup {} failed: {}", request_id, e);
            match session
                .save_screenshot(&self.config.screenshot_dir, request_id)
                .await
            {
                Ok(path) => info!("Diagnostic screenshot saved to {}", path.display()),
                Err(shot_err) => warn!("Could not save diagnostic screenshot: {}", shot_err),
            }
        }

        session.close().await;
        info!("Lookup {} finished in {:?}", request_id, started.elapsed());
        result
    }
}
