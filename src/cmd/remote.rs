//! The `remote` subcommand, which only asks the reader service.

use clap::Args;
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use crate::{
    coordinator::{ExtractionResult, PdfSource},
    errors::ExtractError,
    output::{OutputOpts, render, write_output},
    prelude::*,
    remote::{RemoteExtractor, RemoteOpts, jina::JinaReader},
    ui::{ProgressConfig, Ui},
};

/// Remote command line arguments.
#[derive(Debug, Args)]
pub struct RemoteCmdOpts {
    /// A PDF file, or an http(s) URL pointing to one.
    #[clap(value_name = "PDF")]
    pub input: String,

    #[clap(flatten)]
    pub remote: RemoteOpts,

    #[clap(flatten)]
    pub output: OutputOpts,
}

/// The `remote` subcommand. The quality gate is not applied here, so this is
/// handy for seeing exactly what the reader service makes of a PDF.
#[instrument(level = "debug", skip_all, fields(input = %opts.input))]
pub async fn cmd_remote(
    ui: Ui,
    opts: &RemoteCmdOpts,
    cancel: &CancellationToken,
) -> Result<()> {
    let source = PdfSource::from_arg(&opts.input).await?;
    let reader = JinaReader::new(&opts.remote)?;

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🌐",
        msg: "Asking reader service",
        done_msg: "Asked reader service",
    });
    let text = ask_reader(&reader, &source, &spinner, cancel).await?;

    let text = text.ok_or_else(|| anyhow!("the reader service returned no usable content"))?;
    let rendered = render(ExtractionResult::Remote(text), &opts.output)?;
    write_output(opts.output.output_path.as_deref(), &rendered).await
}

/// Ask `reader` about `source`, stopping `spinner` however the request ends.
async fn ask_reader(
    reader: &dyn RemoteExtractor,
    source: &PdfSource,
    spinner: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<Option<String>, ExtractError> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        text = async {
            match source {
                PdfSource::Url(url) => reader.extract_from_url(url).await,
                PdfSource::Bytes(pdf) => reader.extract_from_bytes(pdf).await,
            }
        } => Ok(text),
    };
    match &result {
        Ok(_) => spinner.finish_using_style(),
        Err(_) => spinner.abandon(),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader;

    #[async_trait]
    impl RemoteExtractor for FixedReader {
        async fn extract_from_url(&self, _url: &str) -> Option<String> {
            Some("from url".to_owned())
        }

        async fn extract_from_bytes(&self, _pdf: &[u8]) -> Option<String> {
            None
        }
    }

    fn test_spinner(ui: &Ui) -> ProgressBar {
        ui.new_spinner(&ProgressConfig {
            emoji: "🌐",
            msg: "Asking reader service",
            done_msg: "Asked reader service",
        })
    }

    #[tokio::test]
    async fn cancelling_stops_the_spinner() {
        let ui = Ui::init_for_tests();
        let spinner = test_spinner(&ui);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = PdfSource::Url("https://example.com/a.pdf".to_owned());
        let err = ask_reader(&FixedReader, &source, &spinner, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert!(spinner.is_finished());
    }

    #[tokio::test]
    async fn answers_stop_the_spinner() {
        let ui = Ui::init_for_tests();
        let spinner = test_spinner(&ui);

        let source = PdfSource::Url("https://example.com/a.pdf".to_owned());
        let text = ask_reader(&FixedReader, &source, &spinner, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("from url"));
        assert!(spinner.is_finished());

        let spinner = test_spinner(&ui);
        let source = PdfSource::Bytes(b"%PDF-".to_vec());
        let text = ask_reader(&FixedReader, &source, &spinner, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, None);
        assert!(spinner.is_finished());
    }
}
