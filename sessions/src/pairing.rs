//! PAIRING invariant restoration (spec.md §3, §4.4): after any sequence of
//! cancellations, every `assistant.tool_calls[i].id` must have exactly one
//! later `tool{tool_call_id}` before the next assistant turn, and vice versa.

use std::collections::HashSet;

use codelia_protocol::Message;

/// Drop assistant tool-calls with no matching tool output, and tool outputs
/// with no matching assistant call. Idempotent (RT2): running it twice
/// yields the same result as running it once.
pub fn normalize_pairing(messages: Vec<Message>) -> Vec<Message> {
    let mut output: Vec<Message> = Vec::with_capacity(messages.len());
    let mut pending: Option<(usize, HashSet<String>)> = None;

    for message in messages {
        match message {
            Message::Assistant { content, tool_calls } => {
                finalize_pending(&mut output, pending.take());
                let ids = tool_calls.iter().map(|tc| tc.id.clone()).collect();
                output.push(Message::Assistant { content, tool_calls });
                pending = Some((output.len() - 1, ids));
            }
            Message::Tool { tool_call_id, tool_name, content, is_error } => {
                let matched = pending
                    .as_mut()
                    .is_some_and(|(_, ids)| ids.remove(&tool_call_id));
                if matched {
                    output.push(Message::Tool { tool_call_id, tool_name, content, is_error });
                }
                // else: tool output with no assistant call — dropped.
            }
            other => {
                finalize_pending(&mut output, pending.take());
                output.push(other);
            }
        }
    }
    finalize_pending(&mut output, pending.take());
    output
}

fn finalize_pending(output: &mut [Message], pending: Option<(usize, HashSet<String>)>) {
    let Some((idx, unmatched)) = pending else {
        return;
    };
    if unmatched.is_empty() {
        return;
    }
    if let Message::Assistant { tool_calls, .. } = &mut output[idx] {
        tool_calls.retain(|tc| !unmatched.contains(&tc.id));
    }
}
