pub mod apply;
pub mod destroy;
pub mod import;
pub mod plans;
pub mod refresh;
pub mod ssh_keys;
pub mod state;

use colored::Colorize;
use letsflow_cloud::InstanceDocument;

/// One-line summary of an instance document
pub(crate) fn describe_instance(doc: &InstanceDocument) -> String {
    let state = doc
        .state
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let mut line = format!("{} [{}] {}", doc.label, doc.id, state.cyan());
    if !doc.ipv4.is_empty() {
        line.push_str(&format!(" IPv4: {}", doc.ipv4));
    }
    if !doc.ipv6.is_empty() {
        line.push_str(&format!(" IPv6: {}", doc.ipv6));
    }
    line
}
