use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;

use curlrox_rs::{RequestContext, Selector, VERSION};
use tokio::runtime::Runtime;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_bool(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => true,
        "n" | "no" | "false" => false,
        _ => default,
    }
}

fn parse_u64(input: &str, default: u64) -> u64 {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

#[test]
#[ignore = "Requires network access and manual input"]
fn interactive_request() -> Result<(), Box<dyn Error>> {
    println!("curlrox-rs {} interactive smoke test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let url_input = prompt("Target URL [https://example.com]:")?;
    let target_url = if url_input.is_empty() {
        "https://example.com".to_string()
    } else {
        url_input
    };

    let post_answer = prompt("Send as POST with a sample form? (y/N):")?;
    let redirects_answer = prompt("Follow redirects? (Y/n):")?;
    let timeout_answer = prompt("Timeout in seconds [30]:")?;
    let ca_answer = prompt("CA bundle for TLS verification (blank to skip):")?;
    let dump_answer = prompt("Write body to file (blank to skip):")?;

    let mut ctx = RequestContext::new()?;
    ctx.set_uri(target_url.as_str())
        .set_follow_redirects(parse_bool(&redirects_answer, true))
        .set_timeout(Duration::from_secs(parse_u64(&timeout_answer, 30)));
    if !ca_answer.is_empty() {
        ctx.enable_tls_verification(&ca_answer)?;
    }

    let runtime = Runtime::new()?;
    println!("\nFetching {}...", target_url);
    if parse_bool(&post_answer, false) {
        ctx.set_post_payload([("name", "curlrox"), ("language", "Rust")]);
        runtime.block_on(ctx.execute_post())?;
    } else {
        runtime.block_on(ctx.execute_get())?;
    }

    let info = ctx.metadata().ok_or("no metadata recorded")?;
    println!("Status: {}", info.http_code);
    println!("Final URL: {}", info.url);
    println!("Redirects: {}", info.redirect_count);
    println!("Total time: {:.3}s", info.total_time);
    println!("Headers received: {}", info.response_headers.len());

    let snippet: String = ctx.response_text().unwrap_or_default().chars().take(400).collect();
    println!("Body preview (first 400 chars):\n{}\n", snippet);

    let links = ctx.with_parsed_document(|_, document, _| {
        let anchors = Selector::parse("a[href]").expect("valid selector");
        document.select(&anchors).count()
    });
    match links {
        Ok(count) => println!("Links on page: {}", count),
        Err(err) => println!("Could not parse page: {}", err),
    }

    let cookies = ctx.stored_cookies()?;
    println!("Cookies stored in {}: {}", ctx.cookie_file().display(), cookies.len());

    if !dump_answer.is_empty() {
        ctx.write_response_to_file(&dump_answer)?;
    }

    ctx.close()?;
    println!("Interactive test complete. Re-run with different inputs as needed.");
    Ok(())
}
