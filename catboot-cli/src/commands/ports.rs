//! Serial port listing command implementation.

use anyhow::Result;
use console::style;

use catboot::channel::{NativeEnumerator, PortEnumerator};

/// List available serial ports, optionally as JSON.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativeEnumerator::list_ports()?;

    if json {
        let entries: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if ports.is_empty() {
        eprintln!("{} no serial ports found", style("!").yellow().bold());
        return Ok(());
    }

    for port in &ports {
        let mut details = Vec::new();
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            details.push(format!("{vid:04x}:{pid:04x}"));
        }
        if let Some(product) = &port.product {
            details.push(product.clone());
        }
        if details.is_empty() {
            println!("{}", port.name);
        } else {
            println!("{} {}", port.name, style(format!("({})", details.join(", "))).dim());
        }
    }
    Ok(())
}
