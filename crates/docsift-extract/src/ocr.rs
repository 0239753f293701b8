//! OCR engines. The image extractor talks to an [`OcrEngine`]; engines can be
//! swapped without touching the pipeline.

use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use docsift_core::{Error, OcrSettings, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// One recognized word with the engine's confidence in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub words: Vec<OcrWord>,
}

impl OcrOutput {
    /// Mean word confidence, `None` when nothing was recognized.
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.words.is_empty() {
            return None;
        }
        Some(self.words.iter().map(|w| w.confidence).sum::<f64>() / self.words.len() as f64)
    }
}

/// Optical character recognition over a preprocessed PNG image.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, png: &[u8]) -> Result<OcrOutput>;
}

/// Tesseract driven through its command-line interface (TSV output).
pub struct TesseractCli {
    binary: String,
    languages: String,
    timeout: Option<Duration>,
}

impl TesseractCli {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            binary: settings.tesseract_path.clone(),
            languages: settings.languages.clone(),
            timeout: None,
        }
    }

    /// Kill the tesseract process once `timeout` elapses.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, png: &[u8]) -> Result<OcrOutput> {
        let mut command = tokio::process::Command::new(&self.binary);
        command.args(["stdin", "stdout", "-l", &self.languages, "tsv"]);
        let output = run_with_deadline(command, png.to_vec(), self.timeout)?;

        if !output.status.success() {
            return Err(Error::extraction(format!(
                "OCR engine failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Run `command` with `input` on stdin and collect its output. When `deadline`
/// elapses first the child is killed and an error returned.
pub fn run_with_deadline(
    mut command: tokio::process::Command,
    input: Vec<u8>,
    deadline: Option<Duration>,
) -> Result<Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::extraction(format!("OCR runtime unavailable: {}", e)))?;

    runtime.block_on(async move {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::extraction(format!("OCR engine unavailable: {}", e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::extraction("OCR engine stdin unavailable"))?;

        let feed = async move {
            if let Err(e) = stdin.write_all(&input).await {
                debug!("OCR engine closed stdin early: {}", e);
            }
        };
        let finished = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output.map_err(|e| Error::extraction(format!("OCR engine failed: {}", e)))
        };

        match deadline {
            None => finished.await,
            // Dropping the timed-out future drops the child, which kills it.
            Some(limit) => tokio::time::timeout(limit, finished)
                .await
                .unwrap_or_else(|_| {
                    warn!("OCR engine exceeded {:?}; killed", limit);
                    Err(Error::extraction(format!(
                        "OCR engine timed out after {:?}",
                        limit
                    )))
                }),
        }
    })
}

/// Parse Tesseract TSV: word rows are level 5; columns 1–4 locate the line.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut words = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Option<[&str; 4]> = None;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let confidence = match cols[10].trim().parse::<f64>() {
            Ok(c) if c >= 0.0 => c / 100.0,
            _ => continue,
        };
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }

        let key = [cols[1], cols[2], cols[3], cols[4]];
        match lines.last_mut() {
            Some(line) if current_line == Some(key) => {
                line.push(' ');
                line.push_str(text);
            }
            _ => lines.push(text.to_string()),
        }
        current_line = Some(key);
        words.push(OcrWord {
            text: text.to_string(),
            confidence: confidence.min(1.0),
        });
    }

    OcrOutput {
        text: lines.join("\n"),
        words,
    }
}

/// Stand-in used when no OCR engine is installed.
pub struct UnavailableOcr;

impl OcrEngine for UnavailableOcr {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn recognize(&self, _png: &[u8]) -> Result<OcrOutput> {
        Err(Error::extraction("OCR engine unavailable"))
    }
}

/// Tesseract when it can be executed, otherwise [`UnavailableOcr`]. A
/// recognition run is killed after `timeout`.
pub fn create_ocr_engine(
    settings: &OcrSettings,
    timeout: Option<Duration>,
) -> Arc<dyn OcrEngine> {
    let tesseract = TesseractCli::new(settings).with_timeout(timeout);
    if tesseract.is_available() {
        info!("OCR engine: tesseract ({})", settings.languages);
        Arc::new(tesseract)
    } else {
        warn!(
            "Tesseract not found at '{}'; image documents will fail extraction",
            settings.tesseract_path
        );
        Arc::new(UnavailableOcr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t200\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t60\t20\t96.5\tPatient:
5\t1\t1\t1\t1\t2\t80\t10\t50\t20\t91.0\tJohn
5\t1\t1\t1\t2\t1\t10\t40\t70\t20\t88.5\tDiagnosis
5\t1\t1\t1\t2\t2\t90\t40\t40\t20\t-1\t
";

    #[test]
    fn test_parse_tsv() {
        let output = parse_tsv(TSV);
        assert_eq!(output.text, "Patient: John\nDiagnosis");
        assert_eq!(output.words.len(), 3);
        assert!((output.words[0].confidence - 0.965).abs() < 1e-9);
        let mean = output.mean_confidence().unwrap();
        assert!((mean - (0.965 + 0.91 + 0.885) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_empty_tsv() {
        let output = parse_tsv("");
        assert!(output.text.is_empty());
        assert_eq!(output.mean_confidence(), None);
    }

    #[test]
    fn test_unavailable_engine() {
        let err = UnavailableOcr.recognize(b"png").unwrap_err();
        assert_eq!(err.reason(), "OCR engine unavailable");
    }

    #[test]
    fn test_missing_binary_falls_back() {
        let settings = OcrSettings {
            tesseract_path: "/nonexistent/tesseract-binary".into(),
            languages: "eng".into(),
        };
        assert!(!TesseractCli::new(&settings).is_available());
        assert_eq!(create_ocr_engine(&settings, None).name(), "unavailable");
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_engine_is_killed_at_deadline() {
        let mut command = tokio::process::Command::new("sleep");
        command.arg("30");
        let started = std::time::Instant::now();
        let err = run_with_deadline(command, b"png".to_vec(), Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(err.reason().starts_with("OCR engine timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_within_deadline_returns_output() {
        let command = tokio::process::Command::new("cat");
        let output =
            run_with_deadline(command, b"5\t1\t1\t1\t1\t1".to_vec(), Some(Duration::from_secs(10)))
                .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"5\t1\t1\t1\t1\t1");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_engine_binary() {
        let command = tokio::process::Command::new("/nonexistent/tesseract-binary");
        let err = run_with_deadline(command, Vec::new(), None).unwrap_err();
        assert!(err.reason().starts_with("OCR engine unavailable"));
    }
}
