//! Text reports on stdout

use crate::decode::DecodedRecord;
use crate::error::{InsufficientData, RequestError};
use crate::stats::{AggregateStats, SampleSummary, Stat};
use std::io::{self, Write};

const NO_DATA: &str = "no data";

fn fmt_stat(stat: &Stat) -> String {
    match stat {
        Ok(v) => format!("{:.4}", v),
        Err(_) => NO_DATA.to_string(),
    }
}

fn row<W: Write>(w: &mut W, label: &str, value: impl std::fmt::Display) -> io::Result<()> {
    writeln!(w, "{:<42}{}", label, value)
}

fn fmt_samples<T: std::fmt::Display>(values: &[T]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

fn write_summary<W: Write>(
    w: &mut W,
    title: &str,
    unit: &str,
    summary: Result<SampleSummary, InsufficientData>,
) -> io::Result<()> {
    writeln!(w, "{:-^50}", title)?;
    match summary {
        Ok(s) => {
            writeln!(w, "{:<42}{:.4}", format!("Mean ({}):", unit), s.mean)?;
            writeln!(w, "{:<42}{:.4}", format!("Median ({}):", unit), s.median)?;
            writeln!(w, "{:<42}{:.4}", format!("P90 ({}):", unit), s.p90)?;
            writeln!(w, "{:<42}{:.4}", format!("P99 ({}):", unit), s.p99)?;
            writeln!(w, "{:<42}{:.4}", format!("Max ({}):", unit), s.max)?;
        }
        Err(_) => writeln!(w, "{:<42}{}", "Samples:", NO_DATA)?,
    }
    Ok(())
}

/// Write the full report for one batch.
pub fn write_result<W: Write>(w: &mut W, stats: &AggregateStats) -> io::Result<()> {
    writeln!(w)?;
    if let Some(name) = &stats.name {
        writeln!(w, "============ {} ============", name)?;
    }
    writeln!(w, "============ Load Generation Result ==============")?;
    row(w, "Number of requests:", stats.num_requests)?;
    row(w, "Errors:", stats.num_errors)?;
    writeln!(w, "{:<42}{:.2}", "Error rate (%):", stats.error_rate())?;

    write_summary(w, "Total Duration", "s", stats.total_duration_summary())?;
    writeln!(w, "Total durations (s): {}", fmt_samples(&stats.total_duration_samples))?;

    write_summary(w, "Eval Duration", "s", stats.eval_duration_summary())?;
    writeln!(w, "Eval durations (s): {}", fmt_samples(&stats.eval_duration_samples))?;

    writeln!(w, "{:-^50}", "Tokens")?;
    writeln!(w, "Total token counts: {}", fmt_samples(&stats.token_counts))?;
    row(w, "Mean tokens per request:", fmt_stat(&stats.mean_token_count()))?;
    row(w, "Median tokens per request:", fmt_stat(&stats.median_token_count()))?;
    if !stats.prompt_token_counts.is_empty() {
        let prompt_total: u64 = stats.prompt_token_counts.iter().sum();
        row(w, "Total prompt tokens:", prompt_total)?;
    }

    writeln!(w, "{:-^50}", "Throughput")?;
    row(w, "Token throughput (user, tok/s):", fmt_stat(&stats.token_throughput_user()))?;
    row(w, "Request throughput (user, req/s):", fmt_stat(&stats.request_throughput_user()))?;
    row(w, "Token throughput (eval only, tok/s):", fmt_stat(&stats.token_throughput_eval()))?;
    row(w, "Request throughput (eval only, req/s):", fmt_stat(&stats.request_throughput_eval()))?;
    if !stats.prompt_token_counts.is_empty() {
        row(
            w,
            "Prompt token throughput (user, tok/s):",
            fmt_stat(&stats.prompt_token_throughput_user()),
        )?;
    }

    write_summary(w, "Client Latency", "s", stats.client_latency_summary())?;
    write_summary(w, "Time to First Byte", "s", stats.ttfb_summary())?;

    writeln!(w, "==================================================")?;
    Ok(())
}

pub fn print_result(stats: &AggregateStats) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_result(&mut out, stats)
}

/// Side-by-side table for several providers. Needs at least two results.
pub fn write_comparison<W: Write>(w: &mut W, results: &[AggregateStats]) -> io::Result<()> {
    if results.len() < 2 {
        if results.len() == 1 {
            writeln!(w, "\n(Need at least 2 providers to show comparison)")?;
        }
        return Ok(());
    }

    let names: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.name
                .clone()
                .unwrap_or_else(|| format!("Provider {}", i + 1))
        })
        .collect();

    let metric_width = 34;
    let col_width = names.iter().map(|n| n.len()).max().unwrap_or(0).max(12);
    let total_width = metric_width + (col_width + 3) * names.len();
    let separator = "=".repeat(total_width);

    writeln!(w, "\n{}", separator)?;
    write!(w, "{:<width$}", "Metric", width = metric_width)?;
    for name in &names {
        write!(w, " | {:<width$}", name, width = col_width)?;
    }
    writeln!(w)?;
    writeln!(w, "{}", "-".repeat(total_width))?;

    macro_rules! write_row {
        ($label:expr, $value:expr) => {
            write!(w, "{:<width$}", $label, width = metric_width)?;
            for r in results {
                write!(w, " | {:<width$}", $value(r), width = col_width)?;
            }
            writeln!(w)?;
        };
    }

    write_row!("Requests", |r: &AggregateStats| r.num_requests.to_string());
    write_row!("Errors", |r: &AggregateStats| r.num_errors.to_string());
    write_row!("Mean total duration (s)", |r: &AggregateStats| {
        fmt_stat(&r.mean_total_duration())
    });
    write_row!("Median total duration (s)", |r: &AggregateStats| {
        fmt_stat(&r.median_total_duration())
    });
    write_row!("Mean eval duration (s)", |r: &AggregateStats| {
        fmt_stat(&r.mean_eval_duration())
    });
    write_row!("Token throughput (user)", |r: &AggregateStats| {
        fmt_stat(&r.token_throughput_user())
    });
    write_row!("Request throughput (user)", |r: &AggregateStats| {
        fmt_stat(&r.request_throughput_user())
    });
    write_row!("Token throughput (eval only)", |r: &AggregateStats| {
        fmt_stat(&r.token_throughput_eval())
    });
    write_row!("Request throughput (eval only)", |r: &AggregateStats| {
        fmt_stat(&r.request_throughput_eval())
    });

    writeln!(w, "{}", separator)?;
    Ok(())
}

pub fn print_comparison(results: &[AggregateStats]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_comparison(&mut out, results)
}

/// Echo each prompt's generated text, or its error.
pub fn write_responses<W: Write>(
    w: &mut W,
    prompts: &[String],
    outcomes: &[Result<DecodedRecord, RequestError>],
) -> io::Result<()> {
    for (i, (prompt, outcome)) in prompts.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(record) => {
                writeln!(w, "[{}] {}\nResponse: {}\n", i, prompt, record.generated_text)?
            }
            Err(e) => writeln!(w, "[{}] {}\nError: {}\n", i, prompt, e)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::aggregate;

    fn render(stats: &AggregateStats) -> String {
        let mut buf = Vec::new();
        write_result(&mut buf, stats).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_report_states_error_count_and_no_data() {
        let outcomes = vec![Err(RequestError::Task("boom".to_string()))];
        let text = render(&aggregate(&outcomes));

        assert!(text.contains("Number of requests:"));
        assert!(text.lines().any(|l| l.starts_with("Errors:") && l.trim_end().ends_with('1')));
        assert!(text.contains("Token throughput (user, tok/s):"));
        assert!(text.contains(NO_DATA));
    }

    #[test]
    fn test_report_renders_values() {
        let outcomes = vec![Ok(DecodedRecord {
            generated_text: "hi".to_string(),
            total_duration_seconds: Some(2.0),
            eval_duration_seconds: Some(1.0),
            eval_token_count: Some(5),
            ..Default::default()
        })];
        let text = render(&aggregate(&outcomes).with_name(Some("local".to_string())));

        assert!(text.contains("============ local ============"));
        assert!(text.contains("Total durations (s): [2]"));
        assert!(text.contains("2.5000"));
        assert!(text.contains("5.0000"));
    }

    #[test]
    fn test_duration_sections_include_percentiles() {
        let outcomes: Vec<_> = (1..=10)
            .map(|i| {
                Ok(DecodedRecord {
                    total_duration_seconds: Some(i as f64),
                    eval_duration_seconds: Some(i as f64 / 2.0),
                    eval_token_count: Some(4),
                    ..Default::default()
                })
            })
            .collect();
        let text = render(&aggregate(&outcomes));

        let section = |title: &str| -> Vec<String> {
            text.lines()
                .skip_while(|l| !(l.starts_with('-') && l.contains(title)))
                .skip(1)
                .take_while(|l| !l.starts_with('-'))
                .map(str::to_string)
                .collect()
        };

        let total = section("Total Duration");
        assert!(total.iter().any(|l| l.starts_with("P90 (s):") && l.ends_with("9.0000")));
        assert!(total.iter().any(|l| l.starts_with("P99 (s):") && l.ends_with("10.0000")));
        assert!(total.iter().any(|l| l.starts_with("Median (s):") && l.ends_with("5.5000")));

        let eval = section("Eval Duration");
        assert!(eval.iter().any(|l| l.starts_with("P90 (s):") && l.ends_with("4.5000")));
    }

    #[test]
    fn test_comparison_needs_two_results() {
        let mut buf = Vec::new();
        write_comparison(&mut buf, &[]).unwrap();
        assert!(buf.is_empty());

        let a = aggregate(&[]).with_name(Some("a".to_string()));
        let b = aggregate(&[]).with_name(Some("b".to_string()));
        write_comparison(&mut buf, &[a, b]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Token throughput (user)"));
        assert!(text.contains(" | a "));
    }

    #[test]
    fn test_write_responses() {
        let prompts = vec!["p0".to_string(), "p1".to_string()];
        let outcomes = vec![
            Ok(DecodedRecord {
                generated_text: "answer".to_string(),
                ..Default::default()
            }),
            Err(RequestError::Status {
                status: 500,
                body: "oops".to_string(),
            }),
        ];
        let mut buf = Vec::new();
        write_responses(&mut buf, &prompts, &outcomes).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Response: answer"));
        assert!(text.contains("Error: HTTP 500: oops"));
    }
}
