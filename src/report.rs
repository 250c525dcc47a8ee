use std::fmt::{self, Write};

use crate::security::SecurityReport;
use crate::{Analysis, FacetResult};

/// Human-readable report: one section per facet, always in the same order.
pub fn render(analysis: &Analysis) -> String {
    let mut out = String::new();
    write_report(&mut out, analysis).expect("writing to a String");
    out
}

pub fn render_json(analysis: &Analysis) -> serde_json::Result<String> {
    serde_json::to_string_pretty(analysis)
}

fn write_report(out: &mut impl Write, analysis: &Analysis) -> fmt::Result {
    section(
        out,
        "Detected technologies:",
        &analysis.technologies,
        "No technologies detected.",
        |out, techs| {
            for tech in techs {
                writeln!(out, "  - {}", tech)?;
            }
            Ok(techs.len())
        },
    )?;

    section(
        out,
        "Collected cookies:",
        &analysis.cookies,
        "No cookies set.",
        |out, cookies| {
            for cookie in cookies {
                write!(out, "  - {}: {}", cookie.name, cookie.value)?;
                let flags = [(cookie.secure, "Secure"), (cookie.http_only, "HttpOnly")]
                    .iter()
                    .filter(|(set, _)| *set)
                    .map(|(_, flag)| *flag)
                    .collect::<Vec<_>>();
                if !flags.is_empty() {
                    write!(out, " [{}]", flags.join(", "))?;
                }
                writeln!(out)?;
            }
            Ok(cookies.len())
        },
    )?;

    section(
        out,
        "Third-party domains detected:",
        &analysis.third_party_domains,
        "No third-party domains found.",
        |out, domains| {
            for domain in domains {
                writeln!(out, "  - {}", domain)?;
            }
            Ok(domains.len())
        },
    )?;

    section(out, "Security:", &analysis.security, "", write_security)?;
    Ok(())
}

/// Header line, then the facet's bullets, its empty marker, or its failure.
fn section<W, T, F>(
    out: &mut W,
    title: &str,
    facet: &FacetResult<T>,
    empty: &str,
    body: F,
) -> fmt::Result
where
    W: Write,
    F: FnOnce(&mut W, &T) -> Result<usize, fmt::Error>,
{
    writeln!(out, "{}", title)?;
    match facet {
        Ok(value) => {
            if body(out, value)? == 0 && !empty.is_empty() {
                writeln!(out, "  - {}", empty)?;
            }
        }
        Err(message) => writeln!(out, "  ! {}", message)?,
    }
    Ok(())
}

fn write_security<W: Write>(out: &mut W, report: &SecurityReport) -> Result<usize, fmt::Error> {
    if report.uses_https {
        writeln!(out, "  - HTTPS: yes")?;
    } else {
        writeln!(out, "  - HTTPS: no (the site does not use secure HTTPS)")?;
    }
    for header in &report.headers {
        match header.value.as_deref() {
            Some("") => writeln!(out, "  - {}: (empty)", header.name)?,
            Some(value) => writeln!(out, "  - {}: {}", header.name, value)?,
            None => writeln!(out, "  - {}: (not set)", header.name)?,
        }
    }
    Ok(1 + report.headers.len())
}
