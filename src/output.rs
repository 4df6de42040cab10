// src/output.rs
use crate::types::{DomainReport, OutputConfig, OutputFormat, ScoutError, ValidatedResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Consumer of finished enumerations.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Called once per root domain as soon as it is done.
    async fn write_domain(&self, report: &DomainReport) -> Result<(), ScoutError>;

    /// Called once at the end of a run with every root domain's report.
    async fn write_aggregate(&self, reports: &[DomainReport]) -> Result<(), ScoutError>;
}

pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    fn domain_file(&self, directory: &Path, domain: &str) -> PathBuf {
        directory.join(format!("{}.{}", domain, self.config.format.extension()))
    }

    fn create_file(path: &Path) -> Result<BufWriter<File>, ScoutError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ScoutError::OutputError(format!("Failed to create directory: {}", e)))?;
        }
        let file = File::create(path)
            .map_err(|e| ScoutError::OutputError(format!("Failed to create file {}: {}", path.display(), e)))?;
        Ok(BufWriter::new(file))
    }

    fn write_reports<W: Write>(&self, writer: &mut W, reports: &[&DomainReport]) -> Result<(), ScoutError> {
        match self.config.format {
            OutputFormat::Text => self.write_text_output(writer, reports)?,
            OutputFormat::Json => self.write_json_output(writer, reports)?,
            OutputFormat::Csv => self.write_csv_output(writer, reports)?,
            OutputFormat::Aquatone => self.write_aquatone_output(writer, reports)?,
        }
        writer.flush().map_err(|e| ScoutError::OutputError(e.to_string()))
    }

    fn write_text_output<W: Write>(&self, writer: &mut W, reports: &[&DomainReport]) -> Result<(), ScoutError> {
        // Several roots may share hosts; print each once.
        let mut merged: BTreeMap<&str, &ValidatedResult> = BTreeMap::new();
        for result in reports.iter().flat_map(|r| r.results.iter()) {
            merged.entry(result.hostname.as_str()).or_insert(result);
        }

        for result in merged.values() {
            let line = self.text_line(result);
            writeln!(writer, "{}", line).map_err(|e| ScoutError::OutputError(e.to_string()))?;
        }
        Ok(())
    }

    fn text_line(&self, result: &ValidatedResult) -> String {
        let mut line = String::new();
        if self.config.verbose {
            if let Some(source) = result.source {
                line.push_str(&format!("[{}] ", source));
            }
        }
        line.push_str(&result.hostname);
        if self.config.include_ips && result.resolved() {
            line.push_str(" - ");
            line.push_str(&join_addresses(result, ", "));
        }
        line
    }

    fn write_json_output<W: Write>(&self, writer: &mut W, reports: &[&DomainReport]) -> Result<(), ScoutError> {
        let json = match reports {
            [single] => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        }
        .map_err(|e| ScoutError::OutputError(format!("Failed to serialize JSON: {}", e)))?;

        writeln!(writer, "{}", json).map_err(|e| ScoutError::OutputError(e.to_string()))
    }

    fn write_csv_output<W: Write>(&self, writer: &mut W, reports: &[&DomainReport]) -> Result<(), ScoutError> {
        let header = if self.config.include_ips {
            "domain,subdomain,source,resolved,ip_addresses"
        } else {
            "domain,subdomain,source,resolved"
        };
        writeln!(writer, "{}", header).map_err(|e| ScoutError::OutputError(e.to_string()))?;

        for report in reports {
            for result in &report.results {
                let source = result.source.map(|s| s.to_string()).unwrap_or_default();
                let row = if self.config.include_ips {
                    format!(
                        "{},{},{},{},\"{}\"",
                        report.domain,
                        result.hostname,
                        source,
                        result.resolved(),
                        join_addresses(result, ", ")
                    )
                } else {
                    format!("{},{},{},{}", report.domain, result.hostname, source, result.resolved())
                };
                writeln!(writer, "{}", row).map_err(|e| ScoutError::OutputError(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// `{"host": "first ip"}`; unresolved hosts are left out.
    fn write_aquatone_output<W: Write>(&self, writer: &mut W, reports: &[&DomainReport]) -> Result<(), ScoutError> {
        let hosts: BTreeMap<&str, String> = reports
            .iter()
            .flat_map(|r| r.results.iter())
            .filter_map(|result| {
                result
                    .addresses
                    .iter()
                    .next()
                    .map(|ip| (result.hostname.as_str(), ip.to_string()))
            })
            .collect();

        let json = serde_json::to_string_pretty(&hosts)
            .map_err(|e| ScoutError::OutputError(format!("Failed to serialize JSON: {}", e)))?;
        writeln!(writer, "{}", json).map_err(|e| ScoutError::OutputError(e.to_string()))
    }
}

#[async_trait]
impl OutputSink for OutputManager {
    async fn write_domain(&self, report: &DomainReport) -> Result<(), ScoutError> {
        if self.config.file.is_none() {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            self.write_reports(&mut handle, &[report])?;
        }

        if let Some(directory) = &self.config.directory {
            let path = self.domain_file(directory, &report.domain);
            let mut file = Self::create_file(&path)?;
            self.write_reports(&mut file, &[report])?;
            log::info!("Results for {} written to: {}", report.domain, path.display());
        }

        Ok(())
    }

    async fn write_aggregate(&self, reports: &[DomainReport]) -> Result<(), ScoutError> {
        let Some(path) = &self.config.file else {
            return Ok(());
        };

        let reports: Vec<&DomainReport> = reports.iter().collect();
        let mut file = Self::create_file(path)?;
        self.write_reports(&mut file, &reports)?;

        if !self.config.silent {
            eprintln!("Results written to: {}", path.display());
        }
        Ok(())
    }
}

fn join_addresses(result: &ValidatedResult, separator: &str) -> String {
    result
        .addresses
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceId;
    use crate::types::EnumerationStats;
    use std::time::Duration;

    fn result(host: &str, ips: &[&str]) -> ValidatedResult {
        ValidatedResult {
            hostname: host.to_string(),
            source: Some(SourceId::Crtsh),
            addresses: ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        }
    }

    fn report(domain: &str, results: Vec<ValidatedResult>) -> DomainReport {
        DomainReport {
            domain: domain.to_string(),
            stats: EnumerationStats {
                total_found: results.len(),
                unique_subdomains: results.len(),
                resolved_count: results.iter().filter(|r| r.resolved()).count(),
                sources_used: vec!["crtsh".to_string()],
                source_errors: 0,
                duration: Duration::from_millis(5),
            },
            results,
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn manager(format: OutputFormat) -> OutputManager {
        OutputManager::new(OutputConfig {
            format,
            ..OutputConfig::default()
        })
    }

    fn render(manager: &OutputManager, reports: &[&DomainReport]) -> String {
        let mut buffer = Vec::new();
        manager.write_reports(&mut buffer, reports).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_text_output_merges_roots() {
        let a = report("example.com", vec![result("a.example.com", &[]), result("b.example.com", &["10.0.0.2"])]);
        let b = report("a.example.com", vec![result("a.example.com", &[])]);

        let text = render(&manager(OutputFormat::Text), &[&a, &b]);
        assert_eq!(text, "a.example.com\nb.example.com - 10.0.0.2\n");
    }

    #[test]
    fn test_verbose_text_shows_source() {
        let mut m = manager(OutputFormat::Text);
        m.config.verbose = true;
        m.config.include_ips = false;
        let r = report("example.com", vec![result("b.example.com", &["10.0.0.2"])]);
        assert_eq!(render(&m, &[&r]), "[crtsh] b.example.com\n");
    }

    #[test]
    fn test_csv_output() {
        let r = report("example.com", vec![result("b.example.com", &["10.0.0.2", "10.0.0.1"])]);
        let csv = render(&manager(OutputFormat::Csv), &[&r]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "domain,subdomain,source,resolved,ip_addresses");
        assert_eq!(lines[1], "example.com,b.example.com,crtsh,true,\"10.0.0.1, 10.0.0.2\"");
    }

    #[test]
    fn test_aquatone_output_skips_unresolved() {
        let r = report(
            "example.com",
            vec![result("a.example.com", &[]), result("b.example.com", &["10.0.0.2"])],
        );
        let json = render(&manager(OutputFormat::Aquatone), &[&r]);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, serde_json::json!({"b.example.com": "10.0.0.2"}));
    }

    #[test]
    fn test_json_single_report_is_object() {
        let r = report("example.com", vec![result("a.example.com", &[])]);
        let parsed: serde_json::Value =
            serde_json::from_str(&render(&manager(OutputFormat::Json), &[&r])).unwrap();
        assert_eq!(parsed["domain"], "example.com");
        assert_eq!(parsed["results"][0]["hostname"], "a.example.com");
    }

    #[tokio::test]
    async fn test_directory_and_aggregate_files() {
        let dir = tempfile::tempdir().unwrap();
        let aggregate = dir.path().join("all.txt");
        let manager = OutputManager::new(OutputConfig {
            file: Some(aggregate.clone()),
            directory: Some(dir.path().join("per-domain")),
            silent: true,
            ..OutputConfig::default()
        });

        let a = report("example.com", vec![result("www.example.com", &[])]);
        let b = report("example.org", vec![result("mail.example.org", &[])]);
        manager.write_domain(&a).await.unwrap();
        manager.write_domain(&b).await.unwrap();
        manager.write_aggregate(&[a, b]).await.unwrap();

        let per_domain = fs::read_to_string(dir.path().join("per-domain/example.org.txt")).unwrap();
        assert_eq!(per_domain, "mail.example.org\n");
        let all = fs::read_to_string(aggregate).unwrap();
        assert_eq!(all, "mail.example.org\nwww.example.com\n");
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_output_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let manager = OutputManager::new(OutputConfig {
            file: Some(file.path().join("nested/out.txt")),
            silent: true,
            ..OutputConfig::default()
        });
        let err = manager.write_aggregate(&[]).await.unwrap_err();
        assert!(matches!(err, ScoutError::OutputError(_)));
    }
}
