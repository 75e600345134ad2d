//! Tool declarations sent in the request `tools[]` array.
//!
//! The text editor runs client-side through [`super::ToolExecutor`]; web
//! search is executed server-side, so its declaration is the whole
//! integration.

use serde_json::{json, Value};

pub const TEXT_EDITOR_TOOL_TYPE: &str = "text_editor_20250728";
pub const TEXT_EDITOR_TOOL_NAME: &str = "str_replace_based_edit_tool";
pub const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";

#[derive(Debug, Clone, Default)]
pub struct WebSearchOptions {
    pub max_uses: Option<u32>,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub user_location: Option<UserLocation>,
}

/// Approximate location hint passed to the server-side search.
#[derive(Debug, Clone, Default)]
pub struct UserLocation {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
}

pub fn text_editor_tool(max_characters: Option<usize>) -> Value {
    let mut tool = json!({
        "type": TEXT_EDITOR_TOOL_TYPE,
        "name": TEXT_EDITOR_TOOL_NAME,
    });
    if let Some(max_characters) = max_characters {
        tool["max_characters"] = json!(max_characters);
    }
    tool
}

pub fn web_search_tool(options: &WebSearchOptions) -> Value {
    let mut tool = json!({
        "type": WEB_SEARCH_TOOL_TYPE,
        "name": WEB_SEARCH_TOOL_NAME,
    });
    if let Some(max_uses) = options.max_uses {
        tool["max_uses"] = json!(max_uses);
    }
    // The server rejects declarations carrying both lists; allow wins here.
    if !options.allowed_domains.is_empty() {
        tool["allowed_domains"] = json!(options.allowed_domains);
    } else if !options.blocked_domains.is_empty() {
        tool["blocked_domains"] = json!(options.blocked_domains);
    }
    if let Some(location) = &options.user_location {
        let mut rendered = json!({ "type": "approximate" });
        if let Some(city) = &location.city {
            rendered["city"] = json!(city);
        }
        if let Some(region) = &location.region {
            rendered["region"] = json!(region);
        }
        if let Some(country) = &location.country {
            rendered["country"] = json!(country);
        }
        if let Some(timezone) = &location.timezone {
            rendered["timezone"] = json!(timezone);
        }
        tool["user_location"] = rendered;
    }
    tool
}

/// The `tools[]` payload for a tool-loop request: the text editor, plus web
/// search when configured.
pub fn tool_definitions(
    max_characters: Option<usize>,
    web_search: Option<&WebSearchOptions>,
) -> Value {
    let mut tools = vec![text_editor_tool(max_characters)];
    if let Some(options) = web_search {
        tools.push(web_search_tool(options));
    }
    Value::Array(tools)
}
