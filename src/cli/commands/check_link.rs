//! Check-link command.

use console::style;

use crate::config::Settings;
use crate::http_client::HttpClient;
use crate::services::{check_link, LinkCheckError};

pub async fn cmd_check_link(settings: &Settings, url: &str) -> anyhow::Result<()> {
    let client = HttpClient::new(&settings.http_settings())?;

    match check_link(&client, url).await {
        Ok(headers) => {
            println!("{} {}", style("✓").green(), url);
            let mut names: Vec<_> = headers.keys().collect();
            names.sort();
            for name in names {
                println!("  {}: {}", style(name).dim(), headers[name]);
            }
        }
        Err(LinkCheckError::MethodNotSupported) => {
            println!(
                "{} {} does not accept HEAD requests; a download may still work",
                style("!").yellow(),
                url
            );
        }
        Err(e) => {
            println!("{} {}: {}", style("✗").red(), url, e);
        }
    }
    Ok(())
}
