//! Incremental parsing of the agent CLI's stream-json output.
//!
//! The CLI emits newline-delimited JSON events. Chunked reads split lines at
//! arbitrary byte positions, so a partial line is carried over until its
//! newline arrives. Malformed lines are skipped, never fatal.

use serde_json::Value;

/// Reassembles newline-delimited records from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: String,
}

impl LineAssembler {
    /// Feed one chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

/// Watches the event stream for an invocation of the sandbox command.
///
/// Streaming events accumulate partial tool-input JSON per content block;
/// `assistant` messages carry complete `tool_use` items as a non-streaming
/// fallback. Only tools on the allow-list count: other tools routinely echo
/// directory listings that contain the marker without invoking anything.
#[derive(Debug)]
pub struct TriggerDetector {
    marker: String,
    trigger_tools: Vec<String>,
    active_tool: Option<String>,
    active_input: String,
    /// Set once the marker is seen in a matching tool's input
    pub triggered: bool,
    /// Set by the terminal `result` event
    pub finished: bool,
}

impl TriggerDetector {
    pub fn new(marker: &str, trigger_tools: &[String]) -> Self {
        Self {
            marker: marker.to_string(),
            trigger_tools: trigger_tools.to_vec(),
            active_tool: None,
            active_input: String::new(),
            triggered: false,
            finished: false,
        }
    }

    /// Feed one complete line from the stream.
    pub fn feed_line(&mut self, line: &str) {
        let event: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return,
        };
        match event.get("type").and_then(|t| t.as_str()) {
            Some("stream_event") => self.feed_stream_event(&event),
            Some("assistant") => self.feed_assistant(&event),
            Some("result") => self.finished = true,
            _ => {}
        }
    }

    fn feed_stream_event(&mut self, event: &Value) {
        let Some(inner) = event.get("event") else {
            return;
        };
        match inner.get("type").and_then(|t| t.as_str()) {
            Some("content_block_start") => {
                let Some(block) = inner.get("content_block") else {
                    return;
                };
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    self.active_tool = block
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(String::from);
                    self.active_input.clear();
                    if let Some(input) = block.get("input") {
                        if !input.is_null() {
                            self.active_input = input.to_string();
                        }
                    }
                    self.check_active();
                }
            }
            Some("content_block_delta") => {
                let Some(delta) = inner.get("delta") else {
                    return;
                };
                if delta.get("type").and_then(|t| t.as_str()) == Some("input_json_delta") {
                    if self.active_tool.is_some() {
                        if let Some(partial) = delta.get("partial_json").and_then(|p| p.as_str()) {
                            self.active_input.push_str(partial);
                            self.check_active();
                        }
                    }
                }
            }
            Some("content_block_stop") => {
                self.check_active();
                self.active_tool = None;
                self.active_input.clear();
            }
            _ => {}
        }
    }

    fn feed_assistant(&mut self, event: &Value) {
        let items = event
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array());
        let Some(items) = items else {
            return;
        };
        for item in items {
            if item.get("type").and_then(|t| t.as_str()) != Some("tool_use") {
                continue;
            }
            let Some(name) = item.get("name").and_then(|n| n.as_str()) else {
                continue;
            };
            if !self.tool_matches(name) {
                continue;
            }
            let input = item
                .get("input")
                .map(|v| v.to_string())
                .unwrap_or_default();
            if input.contains(&self.marker) {
                self.triggered = true;
            }
        }
    }

    fn check_active(&mut self) {
        if self.triggered {
            return;
        }
        if let Some(name) = &self.active_tool {
            if self.trigger_tools.iter().any(|t| t == name)
                && self.active_input.contains(&self.marker)
            {
                self.triggered = true;
            }
        }
    }

    fn tool_matches(&self, name: &str) -> bool {
        self.trigger_tools.iter().any(|t| t == name)
    }
}
