// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound packet framing.
//!
//! Commands larger than one wire packet are split into fragments. Each
//! packet carries:
//!
//! ```text
//! [ type/subtype | packets remaining | message id | chunk length |
//!   (total length lo, hi on non-final packets only) | chunk bytes... ]
//! ```
//!
//! The "packets remaining" byte doubles as the continuation flag:
//! non-zero means more packets follow, zero marks the final packet.
//! The message id increments once per logical command and wraps mod
//! 256; it is scoped to the live broker session. Every packet is
//! hex-encoded before handoff to the transport.

/// Maximum size of one wire packet, in bytes, before hex encoding.
pub(crate) const MAX_PACKET_SIZE: usize = 128;

/// Header bytes of a non-final packet.
const PACKET_OVERHEAD: usize = 6;

/// Command payload carried by each non-final packet.
const CHUNK_CAPACITY: usize = MAX_PACKET_SIZE - PACKET_OVERHEAD;

/// Type/subtype pair of device command packets.
pub(crate) const COMMAND_MAINTYPE: u8 = 1;
pub(crate) const COMMAND_SUBTYPE: u8 = 19;

/// Splits a command into hex-encoded wire packets.
///
/// `message_id` identifies the logical command; the caller increments it
/// per call from the session-scoped counter.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn build_packets(
    maintype: u8,
    subtype: u8,
    message_id: u8,
    message: &[u8],
) -> Vec<String> {
    let chunks: Vec<&[u8]> = if message.is_empty() {
        vec![&[]]
    } else {
        message.chunks(CHUNK_CAPACITY).collect()
    };

    chunks
        .iter()
        .enumerate()
        .map(|(n, chunk)| {
            let remaining = chunks.len() - (n + 1);
            let mut packet = Vec::with_capacity(PACKET_OVERHEAD + chunk.len());
            packet.push(maintype * 16 + subtype);
            packet.push(remaining as u8);
            packet.push(message_id);
            packet.push(chunk.len() as u8);
            if remaining > 0 {
                // Little-endian total length of the whole command.
                packet.push((message.len() % 256) as u8);
                packet.push((message.len() / 256) as u8);
            }
            packet.extend_from_slice(chunk);
            hex::encode(packet)
        })
        .collect()
}
