//! Collaborator output stream handling.
//!
//! - `codec`: bounded newline framing over the collaborator's stdout.
//! - `reader`: decodes each line into [`StreamEvent`](crate::models::event::StreamEvent)s,
//!   classifies them, and forwards them to the reconstructor over a bounded channel.

pub mod codec;
pub mod reader;
