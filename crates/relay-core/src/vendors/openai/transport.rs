use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::errors::ProviderError;
use crate::event::{EngineEvent, ToolOutput};
use crate::model::EngineId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// What a single Assistants stream frame means to the engine loop.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RunSignal {
    Event(EngineEvent),
    Completed,
    Done,
}

/// Turns Assistants run-stream frames into engine events.
///
/// Keeps track of which text blocks and tool calls were already announced so
/// `TextCreated` and `ToolCallCreated` fire once per block.
#[derive(Default)]
pub(crate) struct AssistantEventMapper {
    text_blocks: HashSet<(String, u64)>,
    tool_calls: HashMap<(String, u64), String>,
}

impl AssistantEventMapper {
    pub fn map_frame(
        &mut self,
        provider: &EngineId,
        frame: &SseFrame,
    ) -> Result<Vec<RunSignal>, ProviderError> {
        let data = frame.data.trim();
        if data == "[DONE]" || frame.event.as_deref() == Some("done") {
            return Ok(vec![RunSignal::Done]);
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(data).map_err(|e| {
            ProviderError::protocol(provider.clone(), format!("invalid stream payload: {e}"))
        })?;
        let event_type = frame
            .event
            .as_deref()
            .or_else(|| value.get("object").and_then(|v| v.as_str()))
            .unwrap_or_default();
        self.map_json(provider, event_type, &value)
    }

    pub fn map_json(
        &mut self,
        provider: &EngineId,
        event_type: &str,
        value: &Value,
    ) -> Result<Vec<RunSignal>, ProviderError> {
        match event_type {
            "thread.message.delta" => Ok(self.map_message_delta(value)),
            "thread.run.step.delta" => Ok(self.map_step_delta(value)),
            "thread.run.completed" => Ok(vec![RunSignal::Completed]),
            "thread.run.failed"
            | "thread.run.expired"
            | "thread.run.cancelled"
            | "thread.run.incomplete" => {
                let status = event_type.trim_start_matches("thread.run.");
                let message = value
                    .get("last_error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
                    .map(|m| format!("run {status}: {m}"))
                    .unwrap_or_else(|| format!("run {status}"));
                Err(ProviderError::provider(provider.clone(), message, None))
            }
            "thread.run.requires_action" => Err(ProviderError::protocol(
                provider.clone(),
                "run requires tool outputs, which are not supported",
            )),
            "error" => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(|v| v.as_str())
                    .or_else(|| value.get("message").and_then(|v| v.as_str()))
                    .unwrap_or("OpenAI stream error");
                Err(ProviderError::provider(provider.clone(), message, None))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn map_message_delta(&mut self, value: &Value) -> Vec<RunSignal> {
        let message_id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let Some(content) = value.pointer("/delta/content").and_then(|v| v.as_array()) else {
            return Vec::new();
        };

        let mut signals = Vec::new();
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("text") {
                continue;
            }
            let index = part.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if self.text_blocks.insert((message_id.clone(), index)) {
                signals.push(RunSignal::Event(EngineEvent::TextCreated));
            }
            if let Some(text) = part.pointer("/text/value").and_then(|v| v.as_str()) {
                signals.push(RunSignal::Event(EngineEvent::TextDelta {
                    value: text.to_string(),
                }));
            }
        }
        signals
    }

    fn map_step_delta(&mut self, value: &Value) -> Vec<RunSignal> {
        let step_id = value
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let Some(details) = value.pointer("/delta/step_details") else {
            return Vec::new();
        };
        if details.get("type").and_then(|v| v.as_str()) != Some("tool_calls") {
            return Vec::new();
        }
        let Some(calls) = details.get("tool_calls").and_then(|v| v.as_array()) else {
            return Vec::new();
        };

        let mut signals = Vec::new();
        for call in calls {
            let index = call.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            let kind = match self.tool_calls.entry((step_id.clone(), index)) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let kind = call
                        .get("type")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string();
                    entry.insert(kind.clone());
                    signals.push(RunSignal::Event(EngineEvent::ToolCallCreated {
                        kind: kind.clone(),
                    }));
                    kind
                }
            };
            let outputs = call
                .get(kind.as_str())
                .and_then(|details| details.get("outputs"))
                .and_then(|v| v.as_array())
                .map(|outputs| outputs.iter().map(parse_tool_output).collect())
                .unwrap_or_default();
            signals.push(RunSignal::Event(EngineEvent::ToolCallDelta { kind, outputs }));
        }
        signals
    }
}

fn parse_tool_output(value: &Value) -> ToolOutput {
    serde_json::from_value(value.clone()).unwrap_or(ToolOutput::Unknown)
}
