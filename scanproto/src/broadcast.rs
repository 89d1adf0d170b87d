//! UDP broadcast transport with fixed inter-frame pacing.
//!
//! The scan card listens on the whole subnet rather than a configured
//! address, so the sender computes the subnet broadcast address from the
//! first active (non-loopback) IPv4 interface and fires unacknowledged
//! datagrams at it, one frame per datagram, sleeping a fixed pacing
//! interval between sends to respect the card's ingestion rate.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{net::UdpSocket, process::Command};

use crate::{cancel::CancelToken, frame::Frame};

/// Port the scan card listens on.
pub const DEFAULT_PORT: u16 = 5005;

/// Delay between consecutive frame transmissions.
pub const DEFAULT_PACING: Duration = Duration::from_millis(20);

/// How a batch send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every frame was attempted.
    Sent {
        /// Frames that left the socket.
        sent: usize,
        /// Frames dropped by per-send socket failures.
        skipped: usize,
    },
    /// Cancellation was observed; the remaining frames were never sent.
    Cancelled {
        /// Frames that left the socket before the cancel was seen.
        sent: usize,
    },
}

/// Broadcast address of a subnet: `ip | !mask`.
pub fn broadcast_addr(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(mask))
}

/// Discover the subnet broadcast address of the first active (non-loopback)
/// IPv4 interface.
///
/// Fails fast when no interface can be found; there is no safe default
/// destination for a broadcast stream.
pub async fn discover_broadcast() -> Result<Ipv4Addr> {
    let dump = interface_dump().await?;
    let Some((ip, mask)) = parse_interface_dump(&dump) else {
        anyhow::bail!("no usable IPv4 interface found");
    };
    let broadcast = broadcast_addr(ip, mask);
    tracing::debug!("discovered broadcast address {} (interface {}, mask {})", broadcast, ip, mask);
    Ok(broadcast)
}

#[cfg(target_os = "linux")]
async fn interface_dump() -> Result<String> {
    run_tool("ip", &["addr"]).await
}

#[cfg(target_os = "macos")]
async fn interface_dump() -> Result<String> {
    run_tool("ifconfig", &[]).await
}

#[cfg(target_os = "windows")]
async fn interface_dump() -> Result<String> {
    run_tool("ipconfig", &[]).await
}

async fn run_tool(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to execute {}", program))?;

    if !output.status.success() {
        anyhow::bail!("{} exited with {}", program, output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Pull the first non-loopback IPv4 address and netmask out of whichever
/// platform tool output this is.
fn parse_interface_dump(output: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    parse_ip_addr(output)
        .or_else(|| parse_ifconfig(output))
        .or_else(|| parse_ipconfig(output))
}

/// `ip addr` lines: `inet 192.168.1.7/24 brd 192.168.1.255 scope ...`.
fn parse_ip_addr(output: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("inet") {
            continue;
        }
        let Some(cidr) = tokens.next() else {
            continue;
        };
        let Some((addr, prefix)) = cidr.split_once('/') else {
            continue;
        };
        let (Ok(ip), Ok(prefix)) = (addr.parse::<Ipv4Addr>(), prefix.parse::<u8>()) else {
            continue;
        };
        if ip.is_loopback() {
            continue;
        }
        return Some((ip, prefix_mask(prefix)));
    }
    None
}

/// BSD `ifconfig` lines: `inet 192.168.1.7 netmask 0xffffff00 broadcast ...`.
fn parse_ifconfig(output: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&"inet") {
            continue;
        }
        let Some(ip) = tokens.get(1).and_then(|t| t.parse::<Ipv4Addr>().ok()) else {
            continue;
        };
        if ip.is_loopback() {
            continue;
        }
        let Some(pos) = tokens.iter().position(|&t| t == "netmask") else {
            continue;
        };
        let Some(mask) = tokens.get(pos + 1).and_then(|t| parse_mask_token(t)) else {
            continue;
        };
        return Some((ip, mask));
    }
    None
}

/// `ipconfig` pairs an `IPv4 Address` line with the `Subnet Mask` line that
/// follows it inside the same adapter block.
fn parse_ipconfig(output: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let mut found_ip = None;
    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if label.contains("IPv4 Address") && found_ip.is_none() {
            found_ip = value.parse::<Ipv4Addr>().ok().filter(|ip| !ip.is_loopback());
        } else if label.contains("Subnet Mask") {
            if let (Some(ip), Ok(mask)) = (found_ip, value.parse::<Ipv4Addr>()) {
                return Some((ip, mask));
            }
        }
    }
    None
}

/// Netmask tokens are hex (`0xffffff00`) in BSD ifconfig output and dotted
/// quads elsewhere.
fn parse_mask_token(token: &str) -> Option<Ipv4Addr> {
    if let Some(hex) = token.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16).ok().map(Ipv4Addr::from);
    }
    token.parse().ok()
}

fn prefix_mask(prefix: u8) -> Ipv4Addr {
    match prefix {
        0 => Ipv4Addr::from(0u32),
        p if p >= 32 => Ipv4Addr::from(u32::MAX),
        p => Ipv4Addr::from(u32::MAX << (32 - u32::from(p))),
    }
}

/// Paced, best-effort frame sender bound to one broadcast destination.
///
/// The socket is owned by the sender and closed when it drops, which
/// happens whenever the owning job reaches a terminal state.
#[derive(Debug)]
pub struct BroadcastSender {
    socket: UdpSocket,
    target: SocketAddr,
    pacing: Duration,
}

impl BroadcastSender {
    /// Bind a broadcast-capable UDP socket aimed at `addr:port`.
    pub async fn connect(addr: Ipv4Addr, port: u16, pacing: Duration) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("Failed to bind UDP send socket")?;
        socket.set_broadcast(true).context("Failed to enable SO_BROADCAST")?;

        Ok(Self {
            socket,
            target: SocketAddr::from((addr, port)),
            pacing,
        })
    }

    /// The destination frames are sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send each frame as one datagram, sleeping the pacing interval after
    /// every send.
    ///
    /// The cancel token is checked before each frame. A failed send is
    /// logged and that single frame skipped; delivery is best-effort, so
    /// one lost frame must not abort the whole layer. Frames already sent
    /// before a cancel are not retracted.
    pub async fn send(&mut self, frames: &[Frame], cancel: &CancelToken) -> SendOutcome {
        let mut sent = 0;
        let mut skipped = 0;
        for frame in frames {
            if cancel.is_cancelled() {
                tracing::info!(sent = sent, remaining = frames.len() - sent - skipped, "send cancelled");
                return SendOutcome::Cancelled { sent };
            }
            match self.socket.send_to(frame.as_bytes(), self.target).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(error = format!("{:?}", e), "frame send failed, skipping");
                }
            }
            tokio::time::sleep(self.pacing).await;
        }
        SendOutcome::Sent { sent, skipped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameEncoder, GalvoPoint, FRAME_LEN};
    use pretty_assertions::assert_eq;

    #[test]
    fn broadcast_addr_ors_the_inverted_mask() {
        assert_eq!(
            broadcast_addr("192.168.1.7".parse().unwrap(), "255.255.255.0".parse().unwrap()),
            "192.168.1.255".parse::<Ipv4Addr>().unwrap()
        );
        assert_eq!(
            broadcast_addr("10.1.2.3".parse().unwrap(), "255.255.0.0".parse().unwrap()),
            "10.1.255.255".parse::<Ipv4Addr>().unwrap()
        );
    }

    #[test]
    fn prefix_masks() {
        assert_eq!(prefix_mask(24), "255.255.255.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(prefix_mask(16), "255.255.0.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(prefix_mask(0), "0.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(prefix_mask(32), "255.255.255.255".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn ip_addr_output_skips_loopback() {
        let dump = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536
    inet 127.0.0.1/8 scope host lo
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500
    inet 192.168.1.7/24 brd 192.168.1.255 scope global dynamic eth0
    inet6 fe80::1/64 scope link
";
        let (ip, mask) = parse_interface_dump(dump).unwrap();
        assert_eq!(ip, "192.168.1.7".parse::<Ipv4Addr>().unwrap());
        assert_eq!(mask, "255.255.255.0".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn ifconfig_output_parses_hex_netmask() {
        let dump = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
	inet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
	inet 10.0.0.12 netmask 0xffffff00 broadcast 10.0.0.255
";
        let (ip, mask) = parse_interface_dump(dump).unwrap();
        assert_eq!(ip, "10.0.0.12".parse::<Ipv4Addr>().unwrap());
        assert_eq!(mask, "255.255.255.0".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn ipconfig_output_pairs_address_with_mask() {
        let dump = "\
Windows IP Configuration

Ethernet adapter Ethernet:

   IPv4 Address. . . . . . . . . . . : 172.16.4.20
   Subnet Mask . . . . . . . . . . . : 255.255.252.0
   Default Gateway . . . . . . . . . : 172.16.4.1
";
        let (ip, mask) = parse_interface_dump(dump).unwrap();
        assert_eq!(ip, "172.16.4.20".parse::<Ipv4Addr>().unwrap());
        assert_eq!(mask, "255.255.252.0".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn empty_dump_yields_nothing() {
        assert_eq!(parse_interface_dump(""), None);
        assert_eq!(parse_interface_dump("garbage\nlines\n"), None);
    }

    #[tokio::test]
    async fn sends_one_datagram_per_frame_to_the_target() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let encoder = FrameEncoder::new(0, 0).unwrap();
        let frames = encoder
            .encode(
                &[GalvoPoint::new(1, 2), GalvoPoint::new(3, 4)],
                &[GalvoPoint::new(1, 2), GalvoPoint::new(3, 4)],
            )
            .unwrap();

        let mut sender = BroadcastSender::connect(Ipv4Addr::LOCALHOST, port, Duration::ZERO)
            .await
            .unwrap();
        let outcome = sender.send(&frames, &CancelToken::new()).await;
        assert_eq!(outcome, SendOutcome::Sent { sent: 2, skipped: 0 });

        let mut buf = [0u8; 64];
        for frame in &frames {
            let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, FRAME_LEN);
            assert_eq!(&buf[..n], frame.as_bytes());
        }
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_the_first_frame() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let encoder = FrameEncoder::new(0, 0).unwrap();
        let frames = encoder.encode(&[GalvoPoint::CENTER; 4], &[GalvoPoint::CENTER; 4]).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        let mut sender = BroadcastSender::connect(Ipv4Addr::LOCALHOST, port, Duration::ZERO)
            .await
            .unwrap();
        let outcome = sender.send(&frames, &cancel).await;
        assert_eq!(outcome, SendOutcome::Cancelled { sent: 0 });
    }
}
