//! Link-layer decoding down to TCP segments.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::Linktype;

/// One captured TCP segment, addressed client → server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: Bytes,
}

/// Decodes a captured frame. Anything that is not TCP over IP yields `None`.
pub fn decode(linktype: Linktype, data: &[u8]) -> Option<TcpSegment> {
    let sliced = match linktype {
        Linktype::ETHERNET => SlicedPacket::from_ethernet(data).ok()?,
        Linktype::LINUX_SLL => SlicedPacket::from_linux_sll(data).ok()?,
        // BSD loopback: 4-byte address family in host byte order.
        Linktype::NULL | Linktype::LOOP => SlicedPacket::from_ip(data.get(4..)?).ok()?,
        Linktype(12) | Linktype(101) => SlicedPacket::from_ip(data).ok()?,
        _ => return None,
    };

    let (src_ip, dst_ip): (IpAddr, IpAddr) = match sliced.net? {
        NetSlice::Ipv4(ip) => (
            ip.header().source_addr().into(),
            ip.header().destination_addr().into(),
        ),
        NetSlice::Ipv6(ip) => (
            ip.header().source_addr().into(),
            ip.header().destination_addr().into(),
        ),
        #[allow(unreachable_patterns)]
        _ => return None,
    };

    let TransportSlice::Tcp(tcp) = sliced.transport? else {
        return None;
    };

    Some(TcpSegment {
        src: SocketAddr::new(src_ip, tcp.source_port()),
        dst: SocketAddr::new(dst_ip, tcp.destination_port()),
        seq: tcp.sequence_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        payload: Bytes::copy_from_slice(tcp.payload()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn ethernet_tcp(payload: &[u8], seq: u32) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([10, 0, 0, 7], [10, 0, 0, 5], 64)
            .tcp(51234, 80, seq, 65535);
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn decodes_ethernet_ipv4_tcp() {
        let frame = ethernet_tcp(b"GET / HTTP/1.1\r\n", 1000);
        let seg = decode(Linktype::ETHERNET, &frame).unwrap();
        assert_eq!(seg.src, "10.0.0.7:51234".parse().unwrap());
        assert_eq!(seg.dst, "10.0.0.5:80".parse().unwrap());
        assert_eq!(seg.seq, 1000);
        assert!(!seg.syn && !seg.fin && !seg.rst);
        assert_eq!(&seg.payload[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn decodes_raw_ipv6_syn() {
        let builder = PacketBuilder::ipv6([0xfe; 16], [0xfd; 16], 64)
            .tcp(40000, 8080, 7, 1024)
            .syn();
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();

        let seg = decode(Linktype(101), &frame).unwrap();
        assert!(seg.syn);
        assert_eq!(seg.dst.port(), 8080);
        assert!(seg.dst.is_ipv6());
        assert!(seg.payload.is_empty());
    }

    #[test]
    fn decodes_loopback_frame() {
        let builder = PacketBuilder::ipv4([127, 0, 0, 1], [127, 0, 0, 1], 64)
            .tcp(50000, 8000, 1, 1024)
            .fin();
        let mut frame = 2u32.to_ne_bytes().to_vec();
        builder.write(&mut frame, b"x").unwrap();

        let seg = decode(Linktype::NULL, &frame).unwrap();
        assert!(seg.fin);
        assert_eq!(&seg.payload[..], b"x");
    }

    #[test]
    fn ignores_udp_and_garbage() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(53, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"dns").unwrap();

        assert!(decode(Linktype::ETHERNET, &frame).is_none());
        assert!(decode(Linktype::ETHERNET, &[0u8; 5]).is_none());
        assert!(decode(Linktype(147), &ethernet_tcp(b"", 1)).is_none());
    }
}
