//! 考试会话状态机 - 流程层
//!
//! ## 状态
//!
//! ```text
//! Initializing ──摄像头结果/超时──▶ Active ──submit──▶ Submitted
//!       │                        │ ├──违规达到阈值──▶ Disqualified
//!       └────────────────────────┴─┴──确认结束──────▶ Ended
//! ```
//!
//! 三个终止状态都是单向的，进入时无条件释放摄像头、检测定时器、警告计时和切屏监听。
//! 申请超时只是不再等待：授权之后到达时，只要会话还没结束就照常开始监考。
//!
//! ## 并发模型
//!
//! 会话在一个独立任务里运行，所有状态修改都发生在这个任务中：
//! 考生操作、检测结果、切屏事件、警告到期都通过 `select!` 串行处理。
//! 异步结果到达时会重新检查状态，终止后到达的结果一律忽略。

use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::ProctorConfig;
use crate::error::{CaptureError, SessionError};
use crate::infrastructure::camera::{CameraDevice, CameraStream};
use crate::infrastructure::capture::{CaptureManager, CaptureStatus, TickReport};
use crate::infrastructure::face_api::FaceDetector;
use crate::infrastructure::visibility_probe::{VisibilityEvent, VisibilitySource};
use crate::models::quiz::Quiz;
use crate::models::response::TakerResponse;
use crate::services::pose::PoseThresholds;
use crate::services::scoring::{self, QuestionReview, ScoreReport};
use crate::services::violation::{ViolationAccumulator, ViolationOutcome, ViolationRecord};
use crate::services::visibility::{FocusSignal, VisibilityWatcher};
use crate::services::warning::{WarningBoard, WarningChannel};
use crate::workflow::detection_flow::{DetectionFlow, TickOutcome};
use crate::workflow::session_ctx::SessionCtx;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// 摄像头申请中，检测尚未运行
    Initializing,
    /// 正常答题
    Active,
    /// 已提交并判分
    Submitted,
    /// 违规次数达到阈值
    Disqualified,
    /// 考生确认结束，不判分
    Ended,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Initializing => "Initializing",
            SessionState::Active => "Active",
            SessionState::Submitted => "Submitted",
            SessionState::Disqualified => "Disqualified",
            SessionState::Ended => "Ended",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Submitted | SessionState::Disqualified | SessionState::Ended
        )
    }

    /// 考生可以作答、提交、请求结束
    pub fn accepts_answers(self) -> bool {
        matches!(self, SessionState::Initializing | SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 给显示层的会话快照
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub violations: ViolationRecord,
    pub violation_threshold: u32,
    /// 当前显示中的警告
    pub warnings: Vec<(WarningChannel, String)>,
    pub answered: usize,
    pub total: usize,
    pub end_confirmation_pending: bool,
    pub camera: CaptureStatus,
    pub score: Option<ScoreReport>,
}

impl SessionSnapshot {
    pub fn warning(&self, channel: WarningChannel) -> Option<&str> {
        self.warnings
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, message)| message.as_str())
    }

    /// "Proctoring Violations: n/3"，取消资格后不再显示
    pub fn violation_indicator(&self) -> Option<String> {
        if self.violations.count > 0 && !self.violations.disqualified {
            Some(format!(
                "Proctoring Violations: {}/{}",
                self.violations.count, self.violation_threshold
            ))
        } else {
            None
        }
    }
}

/// 会话依赖的外部设备
pub struct ProctorDevices {
    /// None 表示没有摄像头，直接降级
    pub camera: Option<Arc<dyn CameraDevice>>,
    pub detector: Arc<dyn FaceDetector>,
    pub visibility: Option<Box<dyn VisibilitySource>>,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Select {
        question: usize,
        option: usize,
        reply: Reply<()>,
    },
    Submit {
        reply: Reply<ScoreReport>,
    },
    RequestEnd {
        reply: Reply<()>,
    },
    CancelEnd {
        reply: Reply<()>,
    },
    ConfirmEnd {
        reply: Reply<()>,
    },
    Acknowledge {
        reply: Reply<()>,
    },
    Review {
        reply: Reply<Vec<QuestionReview>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// 启动一场监考会话
///
/// 必须在 tokio 运行时中调用；返回后摄像头申请已在后台进行
pub fn start_session(quiz: Quiz, config: ProctorConfig, devices: ProctorDevices) -> SessionHandle {
    let ctx = SessionCtx::new(quiz.quiz_code.clone(), quiz.len());
    let (command_tx, command_rx) = mpsc::channel(32);
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = watch::channel(false);

    let mut actor = SessionActor {
        responses: TakerResponse::new(quiz.len()),
        accumulator: ViolationAccumulator::new(config.violation_threshold),
        warnings: WarningBoard::new(config.warning_clear_delay),
        watcher: VisibilityWatcher::new(),
        flow: DetectionFlow::new(PoseThresholds::from(&config)),
        capture: CaptureManager::new(config.detection_period),
        detector: devices.detector,
        state: SessionState::Initializing,
        score: None,
        end_pending: false,
        forwarder: None,
        snapshot_tx: watch::Sender::new(initial_snapshot(&quiz, &config)),
        exit_tx,
        report_tx,
        ctx,
        quiz,
        config,
    };
    let snapshot_rx = actor.snapshot_tx.subscribe();

    info!("{} 🚀 会话开始，共 {} 题", actor.ctx, actor.ctx.question_count);
    match devices.camera {
        Some(camera) => actor.capture.begin_acquire(camera),
        None => {
            warn!("{} ⚠️ 没有摄像头设备，监考降级为只看切屏", actor.ctx);
            actor.capture.mark_unavailable("no camera device");
            actor.state = SessionState::Active;
        }
    }
    actor.publish();

    let task = tokio::spawn(actor.run(command_rx, report_rx, devices.visibility));

    SessionHandle {
        commands: command_tx,
        snapshot: snapshot_rx,
        exit: exit_rx,
        task: Some(task),
    }
}

fn initial_snapshot(quiz: &Quiz, config: &ProctorConfig) -> SessionSnapshot {
    SessionSnapshot {
        state: SessionState::Initializing,
        violations: ViolationRecord::default(),
        violation_threshold: config.violation_threshold,
        warnings: Vec::new(),
        answered: 0,
        total: quiz.len(),
        end_confirmation_pending: false,
        camera: CaptureStatus::Idle,
        score: None,
    }
}

/// 考生和显示层使用的会话句柄
///
/// 句柄被丢弃时会话任务自动结束并释放摄像头（对应页面卸载）
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    exit: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// 选择第 `question` 题的第 `option` 个选项（均从 0 开始）
    pub async fn select_answer(&self, question: usize, option: usize) -> Result<(), SessionError> {
        self.call(|reply| Command::Select {
            question,
            option,
            reply,
        })
        .await
    }

    /// 提交并判分；未答完时会话保持原状态
    pub async fn submit(&self) -> Result<ScoreReport, SessionError> {
        self.call(|reply| Command::Submit { reply }).await
    }

    /// 打开"是否结束考试"确认
    pub async fn request_end(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::RequestEnd { reply }).await
    }

    /// 继续考试
    pub async fn cancel_end(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::CancelEnd { reply }).await
    }

    /// 确认结束考试
    pub async fn confirm_end(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::ConfirmEnd { reply }).await
    }

    /// 取消资格后确认并退出
    pub async fn acknowledge_disqualification(&self) -> Result<(), SessionError> {
        self.call(|reply| Command::Acknowledge { reply }).await
    }

    /// 提交后的答案回顾
    pub async fn review(&self) -> Result<Vec<QuestionReview>, SessionError> {
        self.call(|reply| Command::Review { reply }).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 订阅快照变化
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// 等待"退出会话"信号（取消资格确认或确认结束）
    pub async fn wait_for_exit(&self) {
        let mut exit = self.exit.clone();
        let _ = exit.wait_for(|requested| *requested).await;
    }

    pub fn exit_requested(&self) -> bool {
        *self.exit.borrow()
    }

    /// 拆除会话：释放所有资源并等待会话任务结束
    pub async fn shutdown(mut self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

struct SessionActor {
    ctx: SessionCtx,
    quiz: Quiz,
    config: ProctorConfig,
    state: SessionState,
    responses: TakerResponse,
    accumulator: ViolationAccumulator,
    warnings: WarningBoard,
    watcher: VisibilityWatcher,
    flow: DetectionFlow,
    capture: CaptureManager,
    detector: Arc<dyn FaceDetector>,
    score: Option<ScoreReport>,
    end_pending: bool,
    /// 切屏事件转发任务，终止时中止
    forwarder: Option<JoinHandle<()>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    exit_tx: watch::Sender<bool>,
    report_tx: mpsc::UnboundedSender<TickReport>,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut reports: mpsc::UnboundedReceiver<TickReport>,
        visibility: Option<Box<dyn VisibilitySource>>,
    ) {
        let (visibility_tx, mut visibility_rx) = mpsc::unbounded_channel();
        let mut visibility_open = visibility.is_some();
        self.forwarder =
            visibility.map(|source| tokio::spawn(forward_visibility(source, visibility_tx)));
        let acquire_deadline = Instant::now() + self.config.camera_acquire_timeout;
        let mut acquire_timed_out = false;

        loop {
            let warning_deadline = self.warnings.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(reply) = self.handle(command).await {
                            self.teardown().await;
                            self.publish();
                            let _ = reply.send(());
                            break;
                        }
                    }
                    None => {
                        debug!("{} 句柄已丢弃，结束会话", self.ctx);
                        break;
                    }
                },
                outcome = self.capture.acquisition(), if self.capture.is_acquiring() => {
                    self.on_camera(outcome).await;
                }
                _ = sleep_until(acquire_deadline), if self.capture.is_acquiring() && !acquire_timed_out => {
                    acquire_timed_out = true;
                    warn!("{} ⚠️ 摄像头申请超时，先开放答题，授权到达后再开始监考", self.ctx);
                    self.activate();
                }
                Some(report) = reports.recv() => self.on_tick(report).await,
                event = visibility_rx.recv(), if visibility_open => match event {
                    Some(event) => self.on_visibility(event).await,
                    None => visibility_open = false,
                },
                _ = sleep_until(warning_deadline.unwrap_or(acquire_deadline)), if warning_deadline.is_some() => {
                    let expired = self.warnings.expire(Instant::now());
                    debug!("{} 警告到期: {:?}", self.ctx, expired);
                }
            }

            self.publish();
        }

        self.teardown().await;
        self.publish();
    }

    /// `Shutdown` 交回给 `run` 处理
    async fn handle(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Select {
                question,
                option,
                reply,
            } => {
                let result = self.select(question, option);
                self.reply(reply, result);
            }
            Command::Submit { reply } => {
                let result = self.submit().await;
                self.reply(reply, result);
            }
            Command::RequestEnd { reply } => {
                let result = self.require_open("request_end").map(|()| {
                    self.end_pending = true;
                });
                self.reply(reply, result);
            }
            Command::CancelEnd { reply } => {
                let result = self.require_open("cancel_end").map(|()| {
                    self.end_pending = false;
                });
                self.reply(reply, result);
            }
            Command::ConfirmEnd { reply } => {
                let result = self.confirm_end().await;
                self.reply(reply, result);
            }
            Command::Acknowledge { reply } => {
                let result = if self.state == SessionState::Disqualified {
                    info!("{} 考生已确认取消资格，退出会话", self.ctx);
                    self.exit_tx.send_replace(true);
                    Ok(())
                } else {
                    Err(self.invalid("acknowledge_disqualification"))
                };
                self.reply(reply, result);
            }
            Command::Review { reply } => {
                let result = if self.state == SessionState::Submitted {
                    Ok(scoring::review(&self.quiz, &self.responses))
                } else {
                    Err(self.invalid("review"))
                };
                self.reply(reply, result);
            }
            Command::Shutdown { reply } => return ControlFlow::Break(reply),
        }
        ControlFlow::Continue(())
    }

    /// 先发布快照再回复，调用方拿到结果时快照已是最新
    fn reply<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn select(&mut self, question: usize, option: usize) -> Result<(), SessionError> {
        self.require_open("select_answer")?;
        let len = self.quiz.len();
        let options = &self
            .quiz
            .questions
            .get(question)
            .ok_or(SessionError::QuestionOutOfRange { index: question, len })?
            .options;
        let text = options.get(option).ok_or(SessionError::OptionOutOfRange {
            index: option,
            len: options.len(),
        })?;
        self.responses.select(question, text.clone())
    }

    async fn submit(&mut self) -> Result<ScoreReport, SessionError> {
        self.require_open("submit")?;
        match scoring::score(&self.quiz, &self.responses) {
            Ok(report) => {
                info!("{} 📤 已提交，得分 {}", self.ctx, report);
                self.score = Some(report);
                self.enter_terminal(SessionState::Submitted).await;
                Ok(report)
            }
            Err(e) => {
                warn!("{} ⚠️ 提交被拒绝: {}", self.ctx, e);
                Err(e)
            }
        }
    }

    async fn confirm_end(&mut self) -> Result<(), SessionError> {
        self.require_open("confirm_end")?;
        if !self.end_pending {
            return Err(SessionError::EndNotRequested);
        }
        self.enter_terminal(SessionState::Ended).await;
        self.exit_tx.send_replace(true);
        Ok(())
    }

    async fn on_camera(&mut self, outcome: Result<Box<dyn CameraStream>, CaptureError>) {
        match outcome {
            Ok(mut stream) if self.state.is_terminal() => {
                debug!("{} 会话已结束，释放迟到的视频流", self.ctx);
                stream.release().await;
            }
            Ok(stream) => {
                self.capture
                    .start(stream, Arc::clone(&self.detector), self.report_tx.clone())
                    .await;
                info!("{} ✓ 监考已启动", self.ctx);
                self.activate();
            }
            Err(e) => {
                warn!("{} ⚠️ {}，监考降级为只看切屏", self.ctx, e);
                self.activate();
            }
        }
    }

    async fn on_tick(&mut self, report: TickReport) {
        // 推理期间会话可能已经结束
        if self.state.is_terminal() || self.accumulator.is_disqualified() {
            debug!("{} 忽略终止后到达的第 {} 帧结果", self.ctx, report.sequence);
            return;
        }

        let outcome = self.flow.evaluate(&report.observed);
        match &outcome {
            TickOutcome::Clean => self.warnings.dismiss(WarningChannel::Proctoring),
            TickOutcome::Failed(e) => debug!("{} 第 {} 帧检测失败: {}", self.ctx, report.sequence, e),
            TickOutcome::Violations(_) => {
                let message = outcome.headline().unwrap_or_default().to_string();
                self.warnings
                    .show(WarningChannel::Proctoring, message.clone(), Instant::now());
                self.record_violation(message).await;
            }
        }
    }

    async fn on_visibility(&mut self, event: VisibilityEvent) {
        if self.state.is_terminal() {
            return;
        }
        let now = Instant::now();
        match self.watcher.on_event(event) {
            FocusSignal::Lost {
                message,
                new_episode,
            } => {
                warn!("{} ⚠️ 检测到切屏: {:?}", self.ctx, event);
                self.warnings.show(WarningChannel::FocusLoss, message, now);
                if new_episode && self.config.count_focus_loss_as_violation {
                    self.record_violation(message.to_string()).await;
                }
            }
            FocusSignal::Regained => self.warnings.clear_soon(WarningChannel::FocusLoss, now),
        }
    }

    async fn record_violation(&mut self, reason: String) {
        if let ViolationOutcome::Disqualified { count } = self.accumulator.record_violation(reason) {
            error!("{} 🚫 违规 {} 次，考试资格已取消", self.ctx, count);
            self.enter_terminal(SessionState::Disqualified).await;
        }
    }

    fn activate(&mut self) {
        if self.state == SessionState::Initializing {
            self.state = SessionState::Active;
        }
    }

    async fn enter_terminal(&mut self, state: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        info!("{} 状态 {} → {}", self.ctx, self.state, state);
        self.state = state;
        self.end_pending = false;
        self.teardown().await;
    }

    /// 释放摄像头、定时器、警告计时和切屏监听；可重复调用
    async fn teardown(&mut self) {
        self.warnings.cancel_all();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.capture.stop().await;
    }

    fn require_open(&self, action: &'static str) -> Result<(), SessionError> {
        if self.state.accepts_answers() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.name(),
            action,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.state,
            violations: self.accumulator.record().clone(),
            violation_threshold: self.accumulator.threshold(),
            warnings: self
                .warnings
                .active()
                .map(|(channel, w)| (channel, w.message.clone()))
                .collect(),
            answered: self.responses.answered_count(),
            total: self.quiz.len(),
            end_confirmation_pending: self.end_pending,
            camera: self.capture.status().clone(),
            score: self.score,
        });
    }
}

async fn forward_visibility(
    mut source: Box<dyn VisibilitySource>,
    tx: mpsc::UnboundedSender<VisibilityEvent>,
) {
    while let Some(event) = source.next_event().await {
        if tx.send(event).is_err() {
            break;
        }
    }
}
