//! Structured extraction from the portal's HTML pages.
//!
//! Everything here is keyed on the element ids the portal's ASP.NET
//! markup uses today. When the site changes, these lookups fail with
//! [`PortalError::PageStructure`] naming the missing piece.

use scraper::{ElementRef, Html, Selector};

use crate::error::PortalError;

use super::{Agent, FormTokens, QueryForm};

/// The three anti-forgery hidden inputs present on every page.
const VIEW_STATE_ID: &str = "__VIEWSTATE";
const EVENT_VALIDATION_ID: &str = "__EVENTVALIDATION";
const VIEW_STATE_GENERATOR_ID: &str = "__VIEWSTATEGENERATOR";

/// Query form fields on the transactions page.
const DATE_FROM_ID: &str = "ctl00_ContentPlaceHolder1_txtDataDeBolsa";
const DATE_TO_ID: &str = "ctl00_ContentPlaceHolder1_txtDataAteBolsa";
const AGENTS_SELECT_ID: &str = "ctl00_ContentPlaceHolder1_ddlAgentes";

/// The agents dropdown carries a "no selection" sentinel entry.
const NO_SELECTION_VALUE: &str = "0";

/// Panel wrapping the trading-history result table.
const RESULT_PANEL_ID: &str =
    "ctl00_ContentPlaceHolder1_rptAgenteBolsa_ctl00_rptContaBolsa_ctl00_pnResumoNegocios";

fn selector(css: &str) -> Selector {
    // All selectors here are built from fixed ids known to be valid CSS.
    Selector::parse(css).expect("valid selector")
}

fn input_value(doc: &Html, id: &str) -> Result<String, PortalError> {
    let input_selector = selector(&format!(r#"input[id="{id}"]"#));
    let input = doc
        .select(&input_selector)
        .next()
        .ok_or_else(|| PortalError::missing(format!("input {id}")))?;
    Ok(input.value().attr("value").unwrap_or_default().to_string())
}

fn tokens_from(doc: &Html) -> Result<FormTokens, PortalError> {
    Ok(FormTokens {
        view_state: input_value(doc, VIEW_STATE_ID)?,
        event_validation: input_value(doc, EVENT_VALIDATION_ID)?,
        view_state_generator: input_value(doc, VIEW_STATE_GENERATOR_ID)?,
    })
}

/// Extract the anti-forgery token set from a response body.
///
/// The tokens rotate on every response; callers must re-extract before
/// every POST and never reuse a set across requests.
pub(super) fn extract_tokens(html: &str) -> Result<FormTokens, PortalError> {
    let doc = Html::parse_document(html);
    tokens_from(&doc)
}

/// Extract everything the query loop needs from the transactions page:
/// fresh tokens, the current date-range values, and the agent list
/// (minus the "no selection" sentinel).
pub(super) fn extract_query_form(html: &str) -> Result<QueryForm, PortalError> {
    let doc = Html::parse_document(html);

    let tokens = tokens_from(&doc)?;
    let date_from = input_value(&doc, DATE_FROM_ID)?;
    let date_to = input_value(&doc, DATE_TO_ID)?;

    let select_selector = selector(&format!(r#"select[id="{AGENTS_SELECT_ID}"]"#));
    let select = doc
        .select(&select_selector)
        .next()
        .ok_or_else(|| PortalError::missing(format!("select {AGENTS_SELECT_ID}")))?;

    let option_selector = selector("option");
    let mut agents = Vec::new();
    for option in select.select(&option_selector) {
        let Some(code) = option.value().attr("value") else {
            continue;
        };
        if code.is_empty() || code == NO_SELECTION_VALUE {
            continue;
        }
        agents.push(Agent {
            code: code.to_string(),
            name: cell_text(option),
        });
    }

    Ok(QueryForm {
        tokens,
        date_from,
        date_to,
        agents,
    })
}

/// Collect the cell texts of every row in the result table.
///
/// Returns `None` when the result panel is absent from the page (the
/// post-login quirk, or a markup change), and `Some(vec![])` when the
/// panel is present but lists no trades.
pub(super) fn extract_result_rows(html: &str) -> Option<Vec<Vec<String>>> {
    let doc = Html::parse_document(html);

    let panel_selector = selector(&format!(r#"div[id="{RESULT_PANEL_ID}"]"#));
    let panel = doc.select(&panel_selector).next()?;

    let row_selector = selector("table tbody tr");
    let td_selector = selector("td");

    let mut rows = Vec::new();
    for tr in panel.select(&row_selector) {
        let cells: Vec<String> = tr.select(&td_selector).map(cell_text).collect();
        if cells.is_empty() || cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(cells);
    }
    Some(rows)
}

fn cell_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with_tokens(extra: &str) -> String {
        format!(
            r#"<html><body><form>
            <input type="hidden" id="__VIEWSTATE" value="vs-1"/>
            <input type="hidden" id="__EVENTVALIDATION" value="ev-1"/>
            <input type="hidden" id="__VIEWSTATEGENERATOR" value="gen-1"/>
            {extra}
            </form></body></html>"#
        )
    }

    const QUERY_FORM_MARKUP: &str = r#"
        <input id="ctl00_ContentPlaceHolder1_txtDataDeBolsa" value="01/01/2023"/>
        <input id="ctl00_ContentPlaceHolder1_txtDataAteBolsa" value="31/03/2023"/>
        <select id="ctl00_ContentPlaceHolder1_ddlAgentes">
            <option value="0">Selecione</option>
            <option value="308" selected="selected">308 - CLEAR</option>
            <option value="1099">1099 - INTER</option>
        </select>"#;

    #[test]
    fn test_extract_tokens() {
        let tokens = extract_tokens(&page_with_tokens("")).unwrap();
        assert_eq!(tokens.view_state, "vs-1");
        assert_eq!(tokens.event_validation, "ev-1");
        assert_eq!(tokens.view_state_generator, "gen-1");
    }

    #[test]
    fn test_missing_view_state_is_page_structure_error() {
        let html = r#"<html><body>
            <input type="hidden" id="__EVENTVALIDATION" value="ev"/>
            <input type="hidden" id="__VIEWSTATEGENERATOR" value="gen"/>
        </body></html>"#;
        let err = extract_tokens(html).unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageStructure { ref field } if field.contains("__VIEWSTATE")
        ));
    }

    #[test]
    fn test_token_without_value_attribute_is_empty() {
        let html = r#"<html><body>
            <input type="hidden" id="__VIEWSTATE"/>
            <input type="hidden" id="__EVENTVALIDATION" value="ev"/>
            <input type="hidden" id="__VIEWSTATEGENERATOR" value="gen"/>
        </body></html>"#;
        let tokens = extract_tokens(html).unwrap();
        assert_eq!(tokens.view_state, "");
    }

    #[test]
    fn test_extract_query_form_excludes_sentinel_agent() {
        let form = extract_query_form(&page_with_tokens(QUERY_FORM_MARKUP)).unwrap();

        assert_eq!(form.date_from, "01/01/2023");
        assert_eq!(form.date_to, "31/03/2023");
        assert_eq!(form.agents.len(), 2);
        assert_eq!(form.agents[0].code, "308");
        assert_eq!(form.agents[0].name, "308 - CLEAR");
        assert_eq!(form.agents[1].code, "1099");
    }

    #[test]
    fn test_query_form_missing_select_fails() {
        let html = page_with_tokens(
            r#"<input id="ctl00_ContentPlaceHolder1_txtDataDeBolsa" value=""/>
               <input id="ctl00_ContentPlaceHolder1_txtDataAteBolsa" value=""/>"#,
        );
        let err = extract_query_form(&html).unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageStructure { ref field } if field.contains("ddlAgentes")
        ));
    }

    #[test]
    fn test_query_form_missing_date_field_fails() {
        let html = page_with_tokens(
            r#"<select id="ctl00_ContentPlaceHolder1_ddlAgentes"></select>"#,
        );
        let err = extract_query_form(&html).unwrap_err();
        assert!(matches!(
            err,
            PortalError::PageStructure { ref field } if field.contains("txtDataDeBolsa")
        ));
    }

    #[test]
    fn test_extract_result_rows() {
        let html = format!(
            r#"<html><body>
            <div id="{RESULT_PANEL_ID}"><table><tbody>
                <tr><td>PETR4</td><td><span>01/01/2023</span></td><td>100</td><td>0</td>
                    <td>10,50</td><td>0,00</td><td>-</td><td>COMPRADA</td></tr>
                <tr><td>VALE3</td><td><span>02/01/2023 a 15/02/2023</span></td><td>50</td><td>50</td>
                    <td>60,00</td><td>65,40</td><td>-</td><td>ZERADA</td></tr>
            </tbody></table></div>
            </body></html>"#
        );

        let rows = extract_result_rows(&html).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "PETR4");
        // Span text inside the period cell is flattened.
        assert_eq!(rows[1][1], "02/01/2023 a 15/02/2023");
    }

    #[test]
    fn test_absent_result_panel_is_none() {
        assert_eq!(extract_result_rows(&page_with_tokens("")), None);
    }

    #[test]
    fn test_empty_result_table_is_some_empty() {
        let html = format!(
            r#"<div id="{RESULT_PANEL_ID}"><table><tbody></tbody></table></div>"#
        );
        assert_eq!(extract_result_rows(&html), Some(vec![]));
    }
}
