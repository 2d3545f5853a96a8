use crate::protocol::turns::{
    ContentPart, ResponseDocument, ResponseItem, ResponseStatus, ResponseStreamEvent,
};

/// Expands a response document into the canonical life-cycle event order.
///
/// Every function here is pure: the same document always yields the same
/// events. The live accumulator reuses the per-item pieces so that relayed
/// and replayed streams are indistinguishable.
pub struct EventSequencer;

impl EventSequencer {
    /// Full event sequence for a finished document.
    ///
    /// A failed document yields only `response.created` followed by
    /// `response.failed`.
    #[must_use]
    pub fn emit(doc: &ResponseDocument) -> Vec<ResponseStreamEvent> {
        let mut events = Vec::with_capacity(4 + doc.output.len() * 6);
        if doc.status == ResponseStatus::Failed {
            events.push(ResponseStreamEvent::Created {
                response: Self::announced(doc),
            });
            events.push(ResponseStreamEvent::Failed {
                response: doc.clone(),
            });
            return events;
        }
        events.extend(Self::opening(&Self::announced(doc)));
        events.extend(Self::items(doc));
        events.push(Self::closing(doc));
        events
    }

    /// `response.created` and `response.in_progress` for an in-progress
    /// document.
    #[must_use]
    pub fn opening(in_progress: &ResponseDocument) -> [ResponseStreamEvent; 2] {
        [
            ResponseStreamEvent::Created {
                response: in_progress.clone(),
            },
            ResponseStreamEvent::InProgress {
                response: in_progress.clone(),
            },
        ]
    }

    /// Per-item events for every output item, in output order.
    #[must_use]
    pub fn items(doc: &ResponseDocument) -> Vec<ResponseStreamEvent> {
        let mut events = Vec::with_capacity(doc.output.len() * 6);
        for (output_index, item) in doc.output.iter().enumerate() {
            Self::push_item_events(&mut events, output_index, item);
        }
        events
    }

    #[must_use]
    pub fn closing(doc: &ResponseDocument) -> ResponseStreamEvent {
        ResponseStreamEvent::Completed {
            response: doc.clone(),
        }
    }

    pub fn push_item_events(
        events: &mut Vec<ResponseStreamEvent>,
        output_index: usize,
        item: &ResponseItem,
    ) {
        match item {
            ResponseItem::Message { id, content, .. } => {
                events.extend(Self::message_opening(output_index, item));
                let text = content.first().map_or("", ContentPart::text);
                if !text.is_empty() {
                    events.push(ResponseStreamEvent::OutputTextDelta {
                        item_id: id.clone(),
                        output_index,
                        content_index: 0,
                        delta: text.to_string(),
                    });
                }
                events.extend(Self::message_closing(output_index, item));
            }
            ResponseItem::FunctionCall { id, arguments, .. } => {
                events.push(ResponseStreamEvent::OutputItemAdded {
                    output_index,
                    item: item.as_added(),
                });
                if !arguments.is_empty() {
                    events.push(ResponseStreamEvent::FunctionCallArgumentsDelta {
                        item_id: id.clone(),
                        output_index,
                        delta: arguments.clone(),
                    });
                }
                events.push(ResponseStreamEvent::FunctionCallArgumentsDone {
                    item_id: id.clone(),
                    output_index,
                    arguments: arguments.clone(),
                });
                events.push(ResponseStreamEvent::OutputItemDone {
                    output_index,
                    item: item.clone(),
                });
            }
        }
    }

    /// `output_item.added` + `content_part.added` for a message item.
    #[must_use]
    pub fn message_opening(output_index: usize, item: &ResponseItem) -> [ResponseStreamEvent; 2] {
        [
            ResponseStreamEvent::OutputItemAdded {
                output_index,
                item: item.as_added(),
            },
            ResponseStreamEvent::ContentPartAdded {
                item_id: item.id().to_string(),
                output_index,
                content_index: 0,
                part: ContentPart::output_text(""),
            },
        ]
    }

    /// `output_text.done` + `content_part.done` + `output_item.done` for a
    /// finished message item.
    #[must_use]
    pub fn message_closing(output_index: usize, item: &ResponseItem) -> [ResponseStreamEvent; 3] {
        let text = match item {
            ResponseItem::Message { content, .. } => content.first().map_or("", ContentPart::text),
            ResponseItem::FunctionCall { .. } => "",
        };
        [
            ResponseStreamEvent::OutputTextDone {
                item_id: item.id().to_string(),
                output_index,
                content_index: 0,
                text: text.to_string(),
            },
            ResponseStreamEvent::ContentPartDone {
                item_id: item.id().to_string(),
                output_index,
                content_index: 0,
                part: ContentPart::output_text(text),
            },
            ResponseStreamEvent::OutputItemDone {
                output_index,
                item: item.clone(),
            },
        ]
    }

    /// The in-progress view of `doc` as announced before any output exists.
    #[must_use]
    pub fn announced(doc: &ResponseDocument) -> ResponseDocument {
        ResponseDocument {
            status: ResponseStatus::InProgress,
            output: Vec::new(),
            usage: None,
            error: None,
            ..doc.clone()
        }
    }
}
