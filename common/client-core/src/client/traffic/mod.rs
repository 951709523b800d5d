// Copyright 2021 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::transport::ProbePacket;
use tokio::sync::mpsc;

pub(crate) mod construction;
pub(crate) mod egress;
pub(crate) mod rate_limit;

pub(crate) type PacketSender = mpsc::Sender<ProbePacket>;
pub(crate) type PacketReceiver = mpsc::Receiver<ProbePacket>;

pub(crate) fn packet_channel(capacity: usize) -> (PacketSender, PacketReceiver) {
    mpsc::channel(capacity.max(1))
}
