//! 终端答题器 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：加载配置和试卷、连接浏览器、创建 JsExecutor
//! 2. **设备装配**：浏览器摄像头、face-api 检测器、可见性探针
//! 3. **交互循环**：读取考生命令，转发给会话，显示警告和状态变化
//! 4. **收尾**：会话结束后释放资源并写入会话摘要
//!
//! 只做调度和显示，不做任何监考判断。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::browser;
use crate::config::{Config, ProctorConfig};
use crate::error::SessionError;
use crate::infrastructure::{
    BrowserCamera, BrowserFaceDetector, BrowserVisibilityProbe, CameraDevice, JsExecutor,
    VisibilitySource,
};
use crate::models::{load_quiz_payload, Quiz};
use crate::services::render::{render_question, RenderedQuestion};
use crate::services::{QuestionReview, Verdict};
use crate::utils::logging;
use crate::workflow::{start_session, ProctorDevices, SessionHandle, SessionSnapshot, SessionState};

/// 考生输入的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakerCommand {
    /// `3 b`：第 3 题选 b
    Select { question: usize, option: usize },
    Submit,
    End,
    Confirm,
    Cancel,
    Review,
    Acknowledge,
    Show,
    Help,
}

/// 解析一行输入；题号从 1 开始，选项用 a-d
pub fn parse_command(line: &str) -> Option<TakerCommand> {
    let mut words = line.split_whitespace();
    let first = words.next()?.to_ascii_lowercase();
    let command = match first.as_str() {
        "submit" => TakerCommand::Submit,
        "end" => TakerCommand::End,
        "yes" | "y" => TakerCommand::Confirm,
        "no" | "n" => TakerCommand::Cancel,
        "review" => TakerCommand::Review,
        "ack" | "ok" => TakerCommand::Acknowledge,
        "show" | "list" => TakerCommand::Show,
        "help" | "?" => TakerCommand::Help,
        number => {
            let question: usize = number.parse().ok()?;
            let option = words.next()?.to_ascii_lowercase();
            let mut chars = option.chars();
            let letter = chars.next()?;
            if chars.next().is_some() && option.trim_end_matches(')') != letter.to_string() {
                return None;
            }
            if question == 0 || !letter.is_ascii_lowercase() {
                return None;
            }
            TakerCommand::Select {
                question: question - 1,
                option: (letter as u8 - b'a') as usize,
            }
        }
    };
    if words.next().is_some() && !matches!(command, TakerCommand::Select { .. }) {
        return None;
    }
    Some(command)
}

const HELP: &str = "命令: <题号> <a-d> 作答 | submit 提交 | end 结束考试 | yes/no 确认 | review 回顾 | ack 确认取消资格 | show 显示题目";

pub fn format_question(question: &RenderedQuestion) -> String {
    let mut out = format!("{}. {}", question.number, question.text);
    if let Some(code) = &question.code {
        out.push_str(&format!("\n    ```\n{}\n    ```", indent(code)));
    }
    for option in &question.options {
        out.push_str(&format!("\n  {}) {}", option.label, option.text));
        if let Some(code) = &option.code {
            out.push_str(&format!("\n{}", indent(code)));
        }
    }
    out
}

const REVIEW_PREVIEW_CHARS: usize = 60;

/// 回顾列表中题干只显示前 60 个字符
pub fn format_review(reviews: &[QuestionReview]) -> String {
    reviews
        .iter()
        .map(|review| {
            let mark = match review.verdict {
                Verdict::Correct => "✓",
                Verdict::Incorrect => "✗",
                Verdict::Unscorable => "?",
            };
            format!(
                "{} {}. {}\n    你的答案: {}\n    正确答案: {}",
                mark,
                review.question.number,
                logging::truncate_text(&review.question.text, REVIEW_PREVIEW_CHARS),
                review.your_answer.as_deref().unwrap_or("(未作答)"),
                review.correct_answer.as_deref().unwrap_or("(无法判定)"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent(code: &str) -> String {
    code.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 两次快照之间考生需要看到的变化
pub fn describe_changes(previous: &SessionSnapshot, current: &SessionSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    for (channel, message) in &current.warnings {
        if previous.warning(*channel) != Some(message.as_str()) {
            lines.push(format!("⚠️ {}", message));
        }
    }
    if current.violations.count != previous.violations.count {
        if let Some(indicator) = current.violation_indicator() {
            lines.push(indicator);
        }
    }
    if current.state != previous.state {
        match current.state {
            SessionState::Disqualified => lines.push(
                "🚫 You have been disqualified from the quiz due to multiple proctoring violations. 输入 ack 退出".to_string(),
            ),
            SessionState::Submitted => {
                if let Some(score) = current.score {
                    lines.push(format!("✅ Your Score: {}（输入 review 查看答案）", score));
                }
            }
            SessionState::Ended => lines.push("考试已结束".to_string()),
            SessionState::Active | SessionState::Initializing => {}
        }
    }
    if current.end_confirmation_pending && !previous.end_confirmation_pending {
        lines.push("Are you sure you want to end the quiz? (yes/no)".to_string());
    }
    lines
}

/// 应用主结构
pub struct App {
    config: Config,
    proctor: ProctorConfig,
    quiz: Quiz,
    _browser: Browser,
    executor: JsExecutor,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;

        let proctor = match &config.proctor_config_file {
            Some(path) => ProctorConfig::from_toml_file(path)
                .with_context(|| format!("加载监考参数失败: {}", path))?,
            None => ProctorConfig::default(),
        };
        logging::log_startup(&config, &proctor);

        let quiz = load_quiz_payload(Path::new(&config.quiz_file))
            .await
            .with_context(|| format!("加载试卷失败: {}", config.quiz_file))?;
        check_activation_window(&quiz);

        let (browser, page) =
            browser::connect_to_browser_and_page(config.browser_debug_port, &config.target_url)
                .await
                .context("连接浏览器失败")?;
        let executor = JsExecutor::new(page);

        Ok(Self {
            config,
            proctor,
            quiz,
            _browser: browser,
            executor,
        })
    }

    /// 运行一场会话直到考生退出
    pub async fn run(self) -> Result<()> {
        let devices = self.build_devices().await;
        let quiz_code = self.quiz.quiz_code.clone();
        let questions: Vec<RenderedQuestion> = self
            .quiz
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| render_question(i, q))
            .collect();

        let handle = start_session(self.quiz, self.proctor, devices);
        print_questions(&questions);
        println!("{}", HELP);

        drive(&handle, &questions).await?;

        let updates = handle.subscribe();
        handle.shutdown().await;
        let snapshot = updates.borrow().clone();
        logging::log_session_summary(&quiz_code, &snapshot, &self.config.output_log_file)?;
        Ok(())
    }

    async fn build_devices(&self) -> ProctorDevices {
        let detector = BrowserFaceDetector::new(self.executor.clone(), &self.config.video_element_id);
        if !detector.load_models().await {
            // 摄像头照常启动，之后每轮检测都按失败处理
            warn!("⚠️ 人脸模型加载失败，检测将不会产生违规");
        }
        let camera: Arc<dyn CameraDevice> = Arc::new(BrowserCamera::new(
            self.executor.clone(),
            &self.config.video_element_id,
        ));
        let visibility: Box<dyn VisibilitySource> = Box::new(BrowserVisibilityProbe::new(
            self.executor.clone(),
            self.proctor.visibility_poll_interval,
        ));
        ProctorDevices {
            camera: Some(camera),
            detector: Arc::new(detector),
            visibility: Some(visibility),
        }
    }
}

fn check_activation_window(quiz: &Quiz) {
    match quiz.activation_window() {
        Some((start, end)) => {
            let now = chrono::Local::now().naive_local();
            if now < start || now > end {
                warn!("⚠️ 当前时间不在试卷有效期内: {} ~ {}", start, end);
            } else {
                info!("试卷有效期: {} ~ {}", start, end);
            }
        }
        None => info!("试卷未设置有效期"),
    }
}

fn print_questions(questions: &[RenderedQuestion]) {
    for question in questions {
        println!("{}\n", format_question(question));
    }
}

async fn drive(handle: &SessionHandle, questions: &[RenderedQuestion]) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = handle.subscribe();
    let mut last = updates.borrow_and_update().clone();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("输入已关闭，结束会话");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(command) => {
                        if let Err(e) = dispatch(handle, command, questions).await {
                            println!("❌ {}", e);
                        }
                    }
                    None => println!("{}", HELP),
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = updates.borrow_and_update().clone();
                for line in describe_changes(&last, &current) {
                    println!("{}", line);
                }
                last = current;
            }
            _ = handle.wait_for_exit() => return Ok(()),
        }
    }
}

async fn dispatch(
    handle: &SessionHandle,
    command: TakerCommand,
    questions: &[RenderedQuestion],
) -> Result<(), SessionError> {
    match command {
        TakerCommand::Select { question, option } => {
            handle.select_answer(question, option).await?;
            let snapshot = handle.snapshot();
            println!("已作答 {}/{}", snapshot.answered, snapshot.total);
        }
        TakerCommand::Submit => {
            handle.submit().await?;
        }
        TakerCommand::End => handle.request_end().await?,
        TakerCommand::Confirm => handle.confirm_end().await?,
        TakerCommand::Cancel => handle.cancel_end().await?,
        TakerCommand::Review => println!("{}", format_review(&handle.review().await?)),
        TakerCommand::Acknowledge => handle.acknowledge_disqualification().await?,
        TakerCommand::Show => print_questions(questions),
        TakerCommand::Help => println!("{}", HELP),
    }
    Ok(())
}
