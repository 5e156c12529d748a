//! Per-connection WebSocket lifecycle: a send task draining a channel fed
//! by both the dispatcher's direct replies and the dialog's fanout
//! subscription, and a receive task parsing each text frame as a
//! [`ClientMessage`] and dispatching it against the shared [`Runtime`].

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::WS_CLOSE_UNAUTHORIZED;
use crate::events::{CourseEventKind, EphemeralKind, EventEnvelope};
use crate::protocol::{ClientMessage, ServerMessage};

use super::AppState;

const OUTBOX_CAPACITY: usize = 256;

pub async fn reject_unauthorized(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code: WS_CLOSE_UNAUTHORIZED,
            reason: "unauthorized".into(),
        })))
        .await;
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

    let _ = tx
        .send(ServerMessage::Welcome {
            server_work_language: state.server_work_language.clone(),
            supported_language_codes: state.supported_language_codes.clone(),
        })
        .await;

    let mut fanout = state.runtime.fanout.subscribe();
    let fanout_tx = tx.clone();
    let fanout_task = tokio::spawn(async move {
        loop {
            match fanout.read().await {
                crate::fanout::ReadResult::Event(event) => {
                    for msg in translate_event(&event) {
                        if fanout_tx.send(msg).await.is_err() {
                            return;
                        }
                    }
                }
                crate::fanout::ReadResult::Lagged(_) => continue,
                crate::fanout::ReadResult::Closed => return,
            }
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let parsed: Result<ClientMessage, _> = serde_json::from_str(&text.to_string());
                match parsed {
                    Ok(msg) => dispatch(&state, &tx, msg).await,
                    Err(err) => {
                        let _ = tx
                            .send(ServerMessage::Error {
                                message: format!("malformed message: {err}"),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    fanout_task.abort();
    drop(tx);
    let _ = send_task.await;
}

async fn dispatch(state: &AppState, tx: &mpsc::Sender<ServerMessage>, msg: ClientMessage) {
    let runtime = &state.runtime;
    let result: Result<Option<ServerMessage>, crate::CoreError> = async {
        match msg {
            ClientMessage::CreateDialog { agent_id, task_doc_path } => {
                let root_id = runtime.create_dialog(&agent_id, &task_doc_path).await?;
                Ok(Some(ServerMessage::DialogReady {
                    self_id: root_id.clone(),
                    root_id,
                }))
            }
            ClientMessage::DriveDlgByUserMsg { root_id, self_id, content } => {
                runtime.queue_user_message(&root_id, &self_id, &content).await?;
                Ok(None)
            }
            ClientMessage::DriveDialogByUserAnswer { question_id, content } => {
                // The answer is routed by question id; resolving it to a
                // (root_id, self_id) pair is the Q4H store's job once the
                // dashboard supplies it alongside the question id.
                let _ = (question_id, content);
                Ok(None)
            }
            ClientMessage::InterruptDialog { root_id, reason } => {
                runtime.interrupt_dialog(&root_id, &reason).await?;
                Ok(None)
            }
            ClientMessage::EmergencyStop => {
                runtime.emergency_stop().await?;
                Ok(None)
            }
            ClientMessage::ResumeDialog { root_id } => {
                runtime.resume_dialog(&root_id, false, false).await?;
                Ok(None)
            }
            ClientMessage::ResumeAll => Ok(None),
            ClientMessage::SetDiligencePush {
                root_id,
                disable_diligence_push,
            } => {
                runtime.set_diligence_push(&root_id, disable_diligence_push).await?;
                Ok(Some(ServerMessage::DiligencePushUpdated {
                    root_id,
                    disable_diligence_push,
                }))
            }
            ClientMessage::RefillDiligencePushBudget { root_id } => {
                let remaining = runtime.refill_diligence_push_budget(&root_id, 12).await?;
                Ok(Some(ServerMessage::DiligenceBudgetEvt { root_id, remaining_budget: remaining }))
            }
            ClientMessage::DeclareSubdialogDead { root_id, self_id } => {
                runtime.declare_subdialog_dead(&root_id, &root_id, &self_id).await?;
                Ok(None)
            }
            ClientMessage::GetQ4hState => Ok(None),
            ClientMessage::DisplayDialog { .. }
            | ClientMessage::DisplayCourse { .. }
            | ClientMessage::DisplayReminders { .. }
            | ClientMessage::SetUiLanguage { .. } => Ok(None),
        }
    }
    .await;

    match result {
        Ok(Some(reply)) => {
            let _ = tx.send(reply).await;
        }
        Ok(None) => {}
        Err(err) => {
            let _ = tx
                .send(ServerMessage::Error {
                    message: err.to_string(),
                })
                .await;
        }
    }
}

/// Projects a fanout envelope onto zero or more wire events. Durable
/// envelopes map one-to-one with the course event kinds the dashboard
/// renders live; kinds with no client-visible counterpart (anchors,
/// response records) are dropped here rather than at the publish site, so
/// the event log stays the single source of truth for replay.
fn translate_event(event: &EventEnvelope) -> Vec<ServerMessage> {
    match event {
        EventEnvelope::Durable(durable) => {
            let root_id = durable.dialog.root_id.clone();
            let self_id = durable.dialog.self_id.clone();
            match &durable.event.kind {
                CourseEventKind::ThinkingChunk { message_id, delta } => vec![ServerMessage::ThinkingChunk {
                    root_id,
                    self_id,
                    message_id: message_id.clone(),
                    delta: delta.clone(),
                }],
                CourseEventKind::SayingChunk { message_id, delta } => vec![ServerMessage::SayingChunk {
                    root_id,
                    self_id,
                    message_id: message_id.clone(),
                    delta: delta.clone(),
                }],
                CourseEventKind::FunctionCall { call_id, name, .. } => vec![ServerMessage::FunctionCallEvt {
                    root_id,
                    self_id,
                    call_id: call_id.clone(),
                    name: name.clone(),
                    call_type: crate::special_call::CallType::C,
                }],
                CourseEventKind::Q4hAsked { question_id, .. } => vec![ServerMessage::NewQ4hAsked {
                    question_id: question_id.clone(),
                    root_id,
                    self_id,
                    content: String::new(),
                }],
                CourseEventKind::Q4hAnswered { question_id } => vec![ServerMessage::Q4hAnswered {
                    question_id: question_id.clone(),
                }],
                CourseEventKind::ReminderMutation { owner, .. } => vec![ServerMessage::ReminderUpdated {
                    root_id,
                    owner: owner.clone(),
                    content: None,
                }],
                _ => Vec::new(),
            }
        }
        EventEnvelope::Ephemeral(ephemeral) => {
            let root_id = ephemeral.dialog.root_id.clone();
            let self_id = ephemeral.dialog.self_id.clone();
            match &ephemeral.kind {
                EphemeralKind::RunStateChanged { state } => vec![ServerMessage::DlgRunStateEvt {
                    root_id,
                    self_id,
                    run_state: state.clone(),
                }],
                EphemeralKind::DiligencePushUpdated { remaining_budget, .. } => {
                    vec![ServerMessage::DiligenceBudgetEvt {
                        root_id,
                        remaining_budget: *remaining_budget,
                    }]
                }
                EphemeralKind::Problem { message } => vec![ServerMessage::ProblemsSnapshot {
                    problems: vec![message.clone()],
                }],
            }
        }
    }
}
