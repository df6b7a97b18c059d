use std::error::Error;
use std::io::{self, Write};

use crate::core::config::data::Config;
use crate::core::policy::ToolPolicy;
use crate::core::session::{connect, env_lookup};
use crate::mcp::catalog::ToolCatalog;
use crate::mcp::transport::McpTransport;

pub async fn list_tools(config: &Config) -> Result<(), Box<dyn Error>> {
    let (client, catalog) = connect(config, env_lookup).await?;
    let server = client
        .server_details()
        .await
        .map(|details| format!("{} {}", details.server_info.name, details.server_info.version));
    client.close().await;

    let policy = ToolPolicy::from_config(&config.policy);
    let mut stdout = io::stdout();
    print_catalog(&mut stdout, server.as_deref(), &catalog, &policy)?;
    Ok(())
}

pub fn print_catalog<W: Write>(
    output: &mut W,
    server: Option<&str>,
    catalog: &ToolCatalog,
    policy: &ToolPolicy,
) -> io::Result<()> {
    if let Some(server) = server {
        writeln!(output, "Server: {server}")?;
    }
    writeln!(output, "{} tools available", catalog.len())?;
    for tool in catalog.iter() {
        let status = if policy.permits(&tool.name) {
            "permitted"
        } else {
            "blocked"
        };
        writeln!(output, "  {:<40} {status}", tool.name)?;
    }
    Ok(())
}
