use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunk::chunk;
use crate::error::ProcessingError;
use crate::models::ReportShape;
use crate::pipeline::classify_and_extract;
use crate::session::{ChatId, ModeStore};
use crate::sheet::{is_supported, read_first_sheet_rows};

pub const MODE_CALLBACK_PREFIX: &str = "mode_";

const HELP_TEXT: &str = "Отправьте XLS файл, и я подготовлю нужный отчет.\n\
     Используйте /start, чтобы выбрать режим обработки.\n\
     /mode показывает текущий режим, /reset возвращает автоматическое определение.";
const MENU_TEXT: &str = "Выберите режим обработки:";
const UNKNOWN_COMMAND_TEXT: &str = "Неизвестная команда. Используйте /start или /help";
const SEND_FILE_TEXT: &str =
    "Пожалуйста, отправьте Excel файл или используйте /start для выбора режима.";
const WRONG_FORMAT_TEXT: &str = "Пожалуйста, отправьте файл в формате Excel (.xlsx или .xls)";
const PROCESSING_TEXT: &str = "⏳ Обрабатываю файл...";
const AUTO_MODE_TEXT: &str = "Режим не выбран: тип файла определяется автоматически.";
const MODE_SET_TEXT: &str = "Режим обработки установлен. Теперь отправьте файл для обработки.";

/// One incoming event from the chat transport.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub chat_id: ChatId,
    #[serde(default)]
    pub text: Option<String>,
    /// Data attached to a pressed menu button.
    #[serde(default)]
    pub callback: Option<String>,
    /// Local path of an uploaded file that the transport already downloaded.
    #[serde(default)]
    pub document: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            buttons: Vec::new(),
        }
    }
}

/// File upload accepted for processing. Runs without touching shared state.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentJob {
    pub chat_id: ChatId,
    pub path: PathBuf,
    pub mode: Option<ReportShape>,
    pub max_message_len: usize,
}

impl DocumentJob {
    pub fn run(&self) -> Vec<Reply> {
        let rows = match read_first_sheet_rows(&self.path) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(chat_id = self.chat_id, path = %self.path.display(), error = %err, "failed to read upload");
                return vec![Reply::text(
                    self.chat_id,
                    format!("Ошибка при обработке файла: {err}"),
                )];
            }
        };

        let text = match classify_and_extract(&rows, self.mode) {
            Ok(report) => report,
            Err(err) => {
                info!(chat_id = self.chat_id, error = ?err, "no report produced");
                err.to_string()
            }
        };

        chunk(&text, self.max_message_len)
            .into_iter()
            .map(|part| Reply::text(self.chat_id, part))
            .collect()
    }
}

#[derive(Debug, PartialEq)]
pub enum Action {
    Send(Vec<Reply>),
    /// Send the placeholder, then run the job.
    Process { placeholder: Reply, job: DocumentJob },
}

pub struct Dispatcher {
    modes: Arc<ModeStore>,
    max_message_len: usize,
}

impl Dispatcher {
    pub fn new(modes: Arc<ModeStore>, max_message_len: usize) -> Self {
        Self {
            modes,
            max_message_len,
        }
    }

    pub fn handle(&self, update: Update) -> Action {
        let chat_id = update.chat_id;
        if let Some(path) = update.document {
            return self.handle_document(chat_id, path);
        }
        if let Some(data) = update.callback {
            return Action::Send(self.handle_callback(chat_id, &data));
        }
        match update.text {
            Some(text) if text.starts_with('/') => Action::Send(self.handle_command(chat_id, &text)),
            _ => Action::Send(vec![Reply::text(chat_id, SEND_FILE_TEXT)]),
        }
    }

    fn handle_command(&self, chat_id: ChatId, text: &str) -> Vec<Reply> {
        let command = text
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_start_matches('/');
        // Group chats address commands as /start@botname.
        let command = command.split('@').next().unwrap_or_default();

        match command {
            "start" | "setmode" => vec![mode_menu(chat_id)],
            "help" => vec![Reply::text(chat_id, HELP_TEXT)],
            "mode" => {
                let text = match self.modes.selection(chat_id) {
                    Some(selection) => format!(
                        "Текущий режим: {} (выбран {})",
                        selection.shape.label(),
                        selection.selected_at.format("%d.%m.%Y %H:%M UTC")
                    ),
                    None => AUTO_MODE_TEXT.to_string(),
                };
                vec![Reply::text(chat_id, text)]
            }
            "reset" => {
                self.modes.clear(chat_id);
                vec![Reply::text(chat_id, AUTO_MODE_TEXT)]
            }
            _ => vec![Reply::text(chat_id, UNKNOWN_COMMAND_TEXT)],
        }
    }

    fn handle_callback(&self, chat_id: ChatId, data: &str) -> Vec<Reply> {
        match parse_mode(data) {
            Ok(shape) => {
                self.modes.set(chat_id, shape);
                vec![
                    Reply::text(chat_id, format!("Режим выбран: {}", shape.label())),
                    Reply::text(chat_id, MODE_SET_TEXT),
                ]
            }
            Err(err) => {
                warn!(chat_id, data, "unknown mode callback");
                vec![Reply::text(chat_id, err.to_string())]
            }
        }
    }

    fn handle_document(&self, chat_id: ChatId, path: PathBuf) -> Action {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !is_supported(&file_name) {
            return Action::Send(vec![Reply::text(chat_id, WRONG_FORMAT_TEXT)]);
        }

        let mode = self.modes.current(chat_id);
        info!(chat_id, file = %file_name, mode = ?mode, "document received");
        Action::Process {
            placeholder: Reply::text(chat_id, PROCESSING_TEXT),
            job: DocumentJob {
                chat_id,
                path,
                mode,
                max_message_len: self.max_message_len,
            },
        }
    }
}

pub fn mode_menu(chat_id: ChatId) -> Reply {
    let buttons = ReportShape::ALL
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|shape| Button {
                    label: shape.label().to_string(),
                    data: format!("{MODE_CALLBACK_PREFIX}{}", shape.mode_id()),
                })
                .collect::<Vec<Button>>()
        })
        .collect();
    Reply {
        chat_id,
        text: MENU_TEXT.to_string(),
        buttons,
    }
}

/// Accepts both `attendance` and the menu callback form `mode_attendance`.
pub fn parse_mode(value: &str) -> Result<ReportShape, ProcessingError> {
    value
        .strip_prefix(MODE_CALLBACK_PREFIX)
        .unwrap_or(value)
        .parse()
}

/// Serves JSON-lines updates from stdin and writes replies to stdout.
/// Uploads from different conversations are processed concurrently.
pub async fn serve(dispatcher: Dispatcher) -> anyhow::Result<()> {
    serve_io(&dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}

async fn serve_io<R, W>(dispatcher: &Dispatcher, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Reply>();
    let writer = tokio::spawn(write_replies(rx, output));

    let dispatched = dispatch_updates(dispatcher, input, tx).await;
    // A dead writer is the cause of any closed-channel error, so report it first.
    writer.await.context("reply writer panicked")??;
    dispatched?;

    info!("input closed, shutting down");
    Ok(())
}

async fn write_replies<W>(mut rx: mpsc::UnboundedReceiver<Reply>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        let mut line = serde_json::to_string(&reply).context("failed to encode reply")?;
        line.push('\n');
        output
            .write_all(line.as_bytes())
            .await
            .context("failed to write reply")?;
        output.flush().await.context("failed to flush replies")?;
    }
    Ok(())
}

fn send(tx: &mpsc::UnboundedSender<Reply>, reply: Reply) -> anyhow::Result<()> {
    tx.send(reply).map_err(|_| anyhow!("reply channel closed"))
}

/// Reads updates until the input ends, then waits for running uploads.
/// Stops with an error as soon as replies can no longer be delivered.
async fn dispatch_updates<R>(
    dispatcher: &Dispatcher,
    input: R,
    tx: mpsc::UnboundedSender<Reply>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut jobs = JoinSet::new();

    loop {
        while let Some(finished) = jobs.try_join_next() {
            finished.context("document job panicked")?;
        }

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read updates")?,
            _ = tx.closed() => bail!("reply channel closed"),
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let update: Update = match serde_json::from_str(&line) {
            Ok(update) => update,
            Err(err) => {
                warn!(error = %err, "skipping malformed update");
                continue;
            }
        };

        match dispatcher.handle(update) {
            Action::Send(replies) => {
                for reply in replies {
                    send(&tx, reply)?;
                }
            }
            Action::Process { placeholder, job } => {
                send(&tx, placeholder)?;
                let tx = tx.clone();
                jobs.spawn_blocking(move || {
                    for reply in job.run() {
                        if tx.send(reply).is_err() {
                            warn!(chat_id = job.chat_id, "reply channel closed, dropping report");
                            break;
                        }
                    }
                });
            }
        }
    }

    while let Some(finished) = jobs.join_next().await {
        finished.context("document job panicked")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    fn dispatcher() -> (Arc<ModeStore>, Dispatcher) {
        let modes = Arc::new(ModeStore::new());
        let dispatcher = Dispatcher::new(Arc::clone(&modes), 4000);
        (modes, dispatcher)
    }

    fn text(chat_id: ChatId, text: &str) -> Update {
        Update {
            chat_id,
            text: Some(text.to_string()),
            callback: None,
            document: None,
        }
    }

    fn replies(action: Action) -> Vec<Reply> {
        match action {
            Action::Send(replies) => replies,
            other => panic!("expected replies, got {other:?}"),
        }
    }

    #[test]
    fn start_sends_six_mode_buttons() {
        let (_, dispatcher) = dispatcher();
        let replies = replies(dispatcher.handle(text(5, "/start")));
        assert_eq!(replies.len(), 1);
        let data: Vec<&str> = replies[0]
            .buttons
            .iter()
            .flatten()
            .map(|button| button.data.as_str())
            .collect();
        assert_eq!(
            data,
            vec![
                "mode_schedule",
                "mode_lessons",
                "mode_students",
                "mode_attendance",
                "mode_checked_homework",
                "mode_submitted_homework",
            ]
        );
    }

    #[test]
    fn help_and_unknown_commands() {
        let (_, dispatcher) = dispatcher();
        assert_eq!(replies(dispatcher.handle(text(1, "/help")))[0].text, HELP_TEXT);
        assert_eq!(
            replies(dispatcher.handle(text(1, "/start@report_bot")))[0].text,
            MENU_TEXT
        );
        assert_eq!(
            replies(dispatcher.handle(text(1, "/grades")))[0].text,
            UNKNOWN_COMMAND_TEXT
        );
        assert_eq!(replies(dispatcher.handle(text(1, "привет")))[0].text, SEND_FILE_TEXT);
    }

    #[test]
    fn mode_and_reset_commands() {
        let (modes, dispatcher) = dispatcher();
        assert_eq!(replies(dispatcher.handle(text(6, "/mode")))[0].text, AUTO_MODE_TEXT);

        modes.set(6, ReportShape::Attendance);
        let current = replies(dispatcher.handle(text(6, "/mode")));
        assert!(current[0].text.starts_with("Текущий режим: Посещаемость (выбран "));

        assert_eq!(replies(dispatcher.handle(text(6, "/reset")))[0].text, AUTO_MODE_TEXT);
        assert_eq!(modes.current(6), None);
    }

    #[test]
    fn callback_sets_mode_for_that_chat_only() {
        let (modes, dispatcher) = dispatcher();
        let update = Update {
            chat_id: 9,
            text: None,
            callback: Some("mode_checked_homework".to_string()),
            document: None,
        };
        let replies = replies(dispatcher.handle(update));
        assert_eq!(replies[0].text, "Режим выбран: Проверенные ДЗ");
        assert_eq!(modes.current(9), Some(ReportShape::CheckedHomework));
        assert_eq!(modes.current(10), None);
    }

    #[test]
    fn unknown_callback_is_reported() {
        let (modes, dispatcher) = dispatcher();
        let update = Update {
            chat_id: 9,
            text: None,
            callback: Some("mode_grades".to_string()),
            document: None,
        };
        let replies = replies(dispatcher.handle(update));
        assert!(replies[0].text.contains("Некорректный режим"));
        assert_eq!(modes.current(9), None);
    }

    #[test]
    fn non_excel_uploads_are_refused() {
        let (_, dispatcher) = dispatcher();
        let update = Update {
            chat_id: 3,
            text: None,
            callback: None,
            document: Some(PathBuf::from("/tmp/notes.txt")),
        };
        assert_eq!(replies(dispatcher.handle(update))[0].text, WRONG_FORMAT_TEXT);
    }

    #[test]
    fn upload_uses_mode_chosen_earlier() {
        let (modes, dispatcher) = dispatcher();
        modes.set(4, ReportShape::Students);
        let update = Update {
            chat_id: 4,
            text: None,
            callback: None,
            document: Some(PathBuf::from("/tmp/grades.xlsx")),
        };
        match dispatcher.handle(update) {
            Action::Process { placeholder, job } => {
                assert_eq!(placeholder.text, PROCESSING_TEXT);
                assert_eq!(job.mode, Some(ReportShape::Students));
                assert_eq!(job.max_message_len, 4000);
            }
            other => panic!("expected a job, got {other:?}"),
        }
    }

    #[test]
    fn job_renders_report_into_replies() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all("ФИО преподавателя,Средняя посещаемость\nСмирнова,39.9%\nКузнецов,40%\n".as_bytes())
            .unwrap();
        file.flush().unwrap();

        let job = DocumentJob {
            chat_id: 2,
            path: file.path().to_path_buf(),
            mode: None,
            max_message_len: 4000,
        };
        let replies = job.run();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("1. Смирнова (39.9%)"));
    }

    #[test]
    fn job_reports_read_errors() {
        let job = DocumentJob {
            chat_id: 2,
            path: PathBuf::from("/nonexistent/report.xlsx"),
            mode: None,
            max_message_len: 4000,
        };
        let replies = job.run();
        assert!(replies[0].text.starts_with("Ошибка при обработке файла"));
    }

    #[test]
    fn updates_decode_from_json_lines() {
        let update: Update = serde_json::from_str(r#"{"chat_id": 12, "callback": "mode_lessons"}"#).unwrap();
        assert_eq!(update.chat_id, 12);
        assert_eq!(update.callback.as_deref(), Some("mode_lessons"));
        assert!(update.text.is_none() && update.document.is_none());
    }

    #[test]
    fn operator_modes_accept_callback_form() {
        assert_eq!(parse_mode("mode_attendance"), Ok(ReportShape::Attendance));
        assert_eq!(parse_mode("lessons"), Ok(ReportShape::LessonTopics));
        assert!(parse_mode("mode_").is_err());
    }

    /// Output whose every write fails, like a closed stdout pipe.
    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn dispatch_stops_when_replies_cannot_be_delivered() {
        let (_, dispatcher) = dispatcher();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        // Input stays open, so only the closed channel can end the loop.
        let (_client, server) = tokio::io::duplex(1024);
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            dispatch_updates(&dispatcher, server, tx),
        )
        .await
        .expect("dispatch loop kept running");
        assert!(result.is_err());

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let input: &[u8] = b"{\"chat_id\":1,\"text\":\"/help\"}\n";
        assert!(dispatch_updates(&dispatcher, input, tx).await.is_err());
    }

    #[tokio::test]
    async fn failed_writer_ends_serving_with_its_error() {
        let (_, dispatcher) = dispatcher();
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(b"{\"chat_id\":1,\"text\":\"/help\"}\n")
            .await
            .unwrap();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            serve_io(&dispatcher, server, ClosedPipe),
        )
        .await
        .expect("serving kept running after the writer failed")
        .unwrap_err();
        assert!(format!("{err:#}").contains("failed to write reply"));
    }

    #[tokio::test]
    async fn serves_commands_and_uploads_as_json_lines() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all("ФИО преподавателя,Средняя посещаемость\nСмирнова,39.9%\n".as_bytes())
            .unwrap();
        file.flush().unwrap();

        let upload = serde_json::json!({ "chat_id": 2, "document": file.path() });
        let input = format!("{{\"chat_id\":1,\"text\":\"/help\"}}\nnot json\n{upload}\n");

        let (_, dispatcher) = dispatcher();
        let (output, mut replies) = tokio::io::duplex(64 * 1024);
        serve_io(&dispatcher, input.as_bytes(), output).await.unwrap();

        let mut written = String::new();
        replies.read_to_string(&mut written).await.unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["chat_id"], 1);
        assert_eq!(lines[0]["text"], HELP_TEXT);
        assert_eq!(lines[1]["text"], PROCESSING_TEXT);
        assert_eq!(lines[2]["chat_id"], 2);
        assert!(lines[2]["text"]
            .as_str()
            .unwrap()
            .contains("1. Смирнова (39.9%)"));
    }
}
