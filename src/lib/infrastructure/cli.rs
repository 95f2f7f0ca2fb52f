//! Command-line front end

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{fs, io::AsyncWriteExt, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        communication::mailer::Attachment,
        dispatch::{errors::SendRequestError, DispatchResult, DispatchService, SendForm, SendRequest},
    },
    infrastructure::email::smtp::SMTPConfig,
};

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(name = "dispatch", about = "Send a templated email to each recipient in a list")]
pub struct Args {
    /// The SMTP relay configuration
    #[clap(flatten)]
    pub smtp: SMTPConfig,

    /// What to send and to whom
    #[clap(flatten)]
    pub message: MessageArgs,

    /// Write the JSON report here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Message, recipients and pacing
#[derive(Debug, Parser)]
pub struct MessageArgs {
    /// Recipients separated by commas, semicolons or newlines
    #[arg(long, short, env = "DISPATCH_RECIPIENTS", default_value = "")]
    pub recipients: String,

    /// File of recipients, appended to --recipients
    #[arg(long)]
    pub recipients_file: Option<PathBuf>,

    /// Subject template
    #[arg(long, short, default_value = "")]
    pub subject: String,

    /// Body template
    #[arg(long, short, default_value = "")]
    pub body: String,

    /// Read the body template from a file instead of --body
    #[arg(long, conflicts_with = "body")]
    pub body_file: Option<PathBuf>,

    /// JSON object of template variables
    #[arg(long, default_value = "{}")]
    pub variables: String,

    /// File to attach to every message; repeat for more
    #[arg(long = "attachment", short)]
    pub attachments: Vec<PathBuf>,

    /// Seconds to wait between sends
    #[arg(long, env = "DISPATCH_DELAY", default_value_t = 0.0)]
    pub delay: f64,

    /// Maximum sends in flight
    #[arg(long, env = "DISPATCH_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,
}

impl Args {
    /// Reads every referenced file and assembles the raw form
    pub async fn into_form(self) -> Result<SendForm> {
        let relay_options = self.smtp.relay_options();
        let message = self.message;

        let mut recipients = message.recipients;
        if let Some(path) = &message.recipients_file {
            let listed = read_text(path).await?;
            recipients = [recipients, listed].join("\n");
        }

        let body = match &message.body_file {
            Some(path) => read_text(path).await?,
            None => message.body,
        };

        Ok(SendForm {
            smtp_server: self.smtp.host,
            smtp_port: self.smtp.port,
            sender_email: self.smtp.username,
            sender_password: self.smtp.password,
            recipients,
            subject: message.subject,
            body,
            delay_seconds: message.delay,
            concurrency: message.concurrency,
            variables: message.variables,
            attachments: read_attachments(&message.attachments).await?,
            relay_options,
        })
    }
}

/// Validates `form` and dispatches it.
///
/// Nothing is sent when the form is invalid.
pub async fn run<D: DispatchService>(
    service: &D,
    form: SendForm,
    cancellation: &CancellationToken,
) -> Result<DispatchResult, SendRequestError> {
    let request = SendRequest::try_from(form)?;

    Ok(service.dispatch(&request, cancellation).await)
}

/// Reads each file fully into memory. Empty files are skipped.
pub async fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    let mut attachments = Vec::with_capacity(paths.len());

    for path in paths {
        let data = fs::read(path)
            .await
            .with_context(|| format!("failed to read attachment {}", path.display()))?;

        if data.is_empty() {
            warn!(path = %path.display(), "skipping empty attachment");
            continue;
        }

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(filename, bytes = data.len(), "loaded attachment");
        attachments.push(Attachment::new(filename, data));
    }

    Ok(attachments)
}

/// Writes the report as pretty JSON to `output`, or stdout
pub async fn write_report(result: &DispatchResult, output: Option<&Path>) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(result).context("failed to serialize report")?;
    json.push(b'\n');

    match output {
        Some(path) => {
            fs::write(path, &json)
                .await
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&json).await.context("failed to write report")?;
            stdout.flush().await.context("failed to flush report")?;
        }
    }

    Ok(())
}

/// Cancels `cancellation` on Ctrl+C or SIGTERM.
///
/// Sends already in flight still complete and are reported.
#[mutants::skip]
pub async fn cancel_on_signal(cancellation: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancellation.cancelled() => return,
    }

    warn!("cancelling dispatch, waiting for sends in flight");
    cancellation.cancel();
}

async fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;

    use crate::domain::{
        communication::mailer::TlsPolicy,
        dispatch::{tests::MockDispatchService, RecipientOutcome},
    };

    use super::*;

    fn form() -> SendForm {
        SendForm {
            sender_email: "sender@example.com".to_string(),
            sender_password: "app-password".to_string(),
            recipients: "a@example.com;b@example.com".to_string(),
            subject: "Hi".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_dispatches_valid_form() -> TestResult {
        let mut service = MockDispatchService::new();

        service
            .expect_dispatch()
            .times(1)
            .withf(|request, _| request.recipients() == ["a@example.com", "b@example.com"])
            .returning(|request, _| {
                DispatchResult::from_outcomes(
                    request
                        .recipients()
                        .iter()
                        .map(|r| RecipientOutcome::sent(r))
                        .collect(),
                    request.recipients().len(),
                )
            });

        let result = run(&service, form(), &CancellationToken::new()).await?;

        assert!(result.success());
        assert_eq!(result.message(), "Sent 2/2 emails successfully");

        Ok(())
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_form() {
        let mut service = MockDispatchService::new();

        service.expect_dispatch().times(0);

        let result = run(
            &service,
            SendForm {
                sender_password: String::new(),
                ..form()
            },
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(SendRequestError::MissingSenderPassword)));
    }

    #[tokio::test]
    async fn test_into_form_reads_files() -> TestResult {
        let dir = tempfile::tempdir()?;
        let recipients = dir.path().join("recipients.txt");
        let body = dir.path().join("body.txt");
        let attachment = dir.path().join("notes.txt");
        let empty = dir.path().join("empty.bin");

        std::fs::write(&recipients, "c@example.com\nd@example.com\n")?;
        std::fs::write(&body, "Hello {{name}}")?;
        std::fs::write(&attachment, "some notes")?;
        std::fs::write(&empty, "")?;

        let args = Args::try_parse_from([
            "dispatch",
            "--smtp-user",
            "sender@example.com",
            "--smtp-password",
            "app-password",
            "--smtp-port",
            "465",
            "--recipients",
            "a@example.com, b@example.com",
            "--recipients-file",
            recipients.to_str().unwrap_or_default(),
            "--subject",
            "Hi {{name}}",
            "--body-file",
            body.to_str().unwrap_or_default(),
            "--variables",
            r#"{"name": "Ada"}"#,
            "--attachment",
            attachment.to_str().unwrap_or_default(),
            "--attachment",
            empty.to_str().unwrap_or_default(),
            "--delay",
            "0.25",
        ])?;

        let form = args.into_form().await?;
        let request = SendRequest::try_from(form.clone())?;

        assert_eq!(form.smtp_port, 465);
        assert_eq!(form.body, "Hello {{name}}");
        assert_eq!(form.attachments.len(), 1);
        assert_eq!(form.attachments[0].filename(), "notes.txt");
        assert_eq!(form.relay_options.tls, TlsPolicy::Required);
        assert_eq!(
            request.recipients(),
            ["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );
        assert!(request.relay().implicit_tls());
        assert_eq!(request.policy().delay, Duration::from_millis(250));

        Ok(())
    }

    #[tokio::test]
    async fn test_read_attachments_missing_file() {
        let result = read_attachments(&[PathBuf::from("/definitely/not/here.pdf")]).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_report_to_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.json");
        let result = DispatchResult::from_outcomes(
            vec![RecipientOutcome::failed("a@example.com", "Connection failed: refused")],
            1,
        );

        write_report(&result, Some(&path)).await?;

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;

        assert_eq!(written["message"], "Sent 0/1 emails successfully");
        assert_eq!(written["results"][0]["message"], "Connection failed: refused");

        Ok(())
    }
}
