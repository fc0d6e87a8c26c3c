//! CEI portal client: replays the site's ASP.NET postback form flow.
//!
//! The portal issues a fresh anti-forgery token set on every response, so
//! the flow is strictly sequential: fetch the login page, post credentials
//! with the extracted tokens, fetch the transactions page with the session
//! cookie, then post one query per brokerage agent - always echoing the
//! tokens from the most recent response and never reusing a set.

mod page;

use anyhow::{Context, Result};
use reqwest::{redirect, Client, Response};
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::records::{parse_row, RowParseError, TradeRecord};

pub const LOGIN_PATH: &str = "/CEI_Responsivo/login.aspx";
pub const TRANSACTIONS_PATH: &str = "/CEI_Responsivo/negociacao-de-ativos.aspx";

/// Cookie carrying the session identity after a successful login.
const SESSION_COOKIE: &str = "Investidor";

// POST field names (ASP.NET WebForms naming).
const FIELD_VIEW_STATE: &str = "__VIEWSTATE";
const FIELD_EVENT_VALIDATION: &str = "__EVENTVALIDATION";
const FIELD_VIEW_STATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
const FIELD_LOGIN_USER: &str = "ctl00$ContentPlaceHolder1$txtLogin";
const FIELD_LOGIN_PASSWORD: &str = "ctl00$ContentPlaceHolder1$txtSenha";
const FIELD_LOGIN_SUBMIT: &str = "ctl00$ContentPlaceHolder1$btnLogar";
const FIELD_QUERY_AGENT: &str = "ctl00$ContentPlaceHolder1$ddlAgentes";
const FIELD_QUERY_ACCOUNT: &str = "ctl00$ContentPlaceHolder1$ddlContas";
const FIELD_QUERY_DATE_FROM: &str = "ctl00$ContentPlaceHolder1$txtDataDeBolsa";
const FIELD_QUERY_DATE_TO: &str = "ctl00$ContentPlaceHolder1$txtDataAteBolsa";
const FIELD_QUERY_SUBMIT: &str = "ctl00$ContentPlaceHolder1$btnConsultar";

const LOGIN_SUBMIT_LABEL: &str = "Entrar";
const QUERY_SUBMIT_LABEL: &str = "Consultar";

/// Query across all accounts of an agent.
const ALL_ACCOUNTS: &str = "0";

/// The three anti-forgery hidden fields echoed back on every POST.
/// Single-use: valid only for the request immediately following the
/// response they were extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormTokens {
    pub view_state: String,
    pub event_validation: String,
    pub view_state_generator: String,
}

/// A brokerage intermediary listed on the transactions page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub code: String,
    pub name: String,
}

/// Query state scraped from the transactions page.
#[derive(Debug, Clone)]
pub struct QueryForm {
    pub tokens: FormTokens,
    pub date_from: String,
    pub date_to: String,
    pub agents: Vec<Agent>,
}

/// An authenticated portal session.
#[derive(Debug, Clone)]
pub struct Session {
    investor: String,
}

impl Session {
    fn cookie_header(&self) -> String {
        format!("{SESSION_COOKIE}={}", self.investor)
    }
}

struct QueryOutcome {
    /// `None` when the response carried no result table at all.
    rows: Option<Vec<Vec<String>>>,
    /// The rotated token set extracted from the response.
    tokens: FormTokens,
}

/// HTTP client for the portal's two endpoints.
pub struct PortalClient {
    http: Client,
    base_url: String,
}

impl PortalClient {
    const USER_AGENT: &'static str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/145.0.0.0 Safari/537.36";

    /// Build a client from config. Redirects are disabled so the session
    /// cookie can be read off the immediate login response.
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .gzip(true)
            .deflate(true)
            .brotli(true);

        if let Some(path) = &config.ca_certificate {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read CA bundle: {}", path.display()))?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .context("Failed to parse CA bundle as PEM")?;
            // Pin: the configured anchor becomes the only accepted root.
            builder = builder
                .add_root_certificate(certificate)
                .tls_built_in_root_certs(false);
        }

        let http = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_html(
        &self,
        path: &str,
        session: Option<&Session>,
    ) -> Result<String, PortalError> {
        let mut request = self.http.get(self.url(path));
        if let Some(session) = session {
            request = request.header("cookie", session.cookie_header());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Transient { status });
        }

        Ok(response.text().await?)
    }

    /// Log in and return the authenticated session.
    ///
    /// Success is judged solely by the presence of the session cookie:
    /// the portal answers HTTP 200 to rejected credentials too.
    pub async fn authenticate(
        &self,
        user: &str,
        password: &str,
    ) -> Result<Session, PortalError> {
        debug!("Fetching login page");
        let login_page = self.get_html(LOGIN_PATH, None).await?;
        let tokens = page::extract_tokens(&login_page)?;

        debug!("Posting credentials");
        let form = [
            (FIELD_LOGIN_USER, user),
            (FIELD_LOGIN_PASSWORD, password),
            (FIELD_LOGIN_SUBMIT, LOGIN_SUBMIT_LABEL),
            (FIELD_VIEW_STATE, tokens.view_state.as_str()),
            (FIELD_EVENT_VALIDATION, tokens.event_validation.as_str()),
            (
                FIELD_VIEW_STATE_GENERATOR,
                tokens.view_state_generator.as_str(),
            ),
        ];

        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        // A successful login may answer 200 or redirect to the dashboard.
        if !status.is_success() && !status.is_redirection() {
            return Err(PortalError::Transient { status });
        }

        let investor = session_cookie(&response).ok_or(PortalError::Auth)?;
        info!("Authenticated with portal");

        Ok(Session { investor })
    }

    /// Pull the full trading history: one query per brokerage agent, in
    /// the order the portal lists them; records are concatenated in that
    /// same order, tagged with the agent code.
    pub async fn fetch_trade_history(
        &self,
        session: &Session,
    ) -> Result<Vec<TradeRecord>, PortalError> {
        let html = self.get_html(TRANSACTIONS_PATH, Some(session)).await?;
        let form = page::extract_query_form(&html)?;
        info!(
            agents = form.agents.len(),
            date_from = %form.date_from,
            date_to = %form.date_to,
            "Loaded transactions page"
        );

        let mut tokens = form.tokens.clone();
        let mut records = Vec::new();

        for agent in &form.agents {
            let outcome = self.query_agent(session, &form, agent, &tokens).await?;
            tokens = outcome.tokens;

            let rows = match outcome.rows {
                Some(rows) => rows,
                None => {
                    // The first query after login often comes back without
                    // the result table even though the request succeeded.
                    // Reissue once with the rotated tokens; a second miss
                    // means this agent has nothing to report.
                    debug!(agent = %agent.code, "Result table absent, retrying once");
                    let retried = self.query_agent(session, &form, agent, &tokens).await?;
                    tokens = retried.tokens;
                    match retried.rows {
                        Some(rows) => rows,
                        None => {
                            debug!(agent = %agent.code, "No trades reported");
                            continue;
                        }
                    }
                }
            };

            match parse_agent_rows(&rows, &agent.code) {
                Ok(parsed) => {
                    debug!(agent = %agent.code, rows = parsed.len(), "Parsed result table");
                    records.extend(parsed);
                }
                Err(err) => {
                    warn!(
                        agent = %agent.code,
                        error = %err,
                        "Dropping agent table: row did not match expected shape"
                    );
                }
            }
        }

        Ok(records)
    }

    async fn query_agent(
        &self,
        session: &Session,
        form: &QueryForm,
        agent: &Agent,
        tokens: &FormTokens,
    ) -> Result<QueryOutcome, PortalError> {
        debug!(agent = %agent.code, "Querying trade history");
        let body = [
            (FIELD_QUERY_AGENT, agent.code.as_str()),
            (FIELD_QUERY_ACCOUNT, ALL_ACCOUNTS),
            (FIELD_QUERY_DATE_FROM, form.date_from.as_str()),
            (FIELD_QUERY_DATE_TO, form.date_to.as_str()),
            (FIELD_QUERY_SUBMIT, QUERY_SUBMIT_LABEL),
            (FIELD_VIEW_STATE, tokens.view_state.as_str()),
            (FIELD_EVENT_VALIDATION, tokens.event_validation.as_str()),
            (
                FIELD_VIEW_STATE_GENERATOR,
                tokens.view_state_generator.as_str(),
            ),
        ];

        let response = self
            .http
            .post(self.url(TRANSACTIONS_PATH))
            .header("cookie", session.cookie_header())
            .form(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Transient { status });
        }

        let html = response.text().await?;
        // The rotated tokens are required for every subsequent POST, so a
        // response without the full set ends the whole run here.
        let tokens = page::extract_tokens(&html)?;
        let rows = page::extract_result_rows(&html);

        Ok(QueryOutcome { rows, tokens })
    }
}

fn parse_agent_rows(rows: &[Vec<String>], agent: &str) -> Result<Vec<TradeRecord>, RowParseError> {
    rows.iter().map(|cells| parse_row(cells, agent)).collect()
}

/// Find the session-identity cookie among the response's `Set-Cookie`
/// headers.
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .find_map(|header| {
            let raw = header.to_str().ok()?;
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            (name.trim() == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}
