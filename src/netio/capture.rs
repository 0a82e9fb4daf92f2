//! Raw packet-socket plumbing: the capture socket each bridge is observed
//! through and the transmit socket bound to a trusted port.
//!
//! Capture sockets carry a classic BPF program equivalent to the pcap
//! expression `"udp and (dst port 68) or (dst port 67)"`, join the
//! interface in promiscuous mode and are always non-blocking.

use std::ffi::CString;
use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};

/// The documented capture filter; `DHCP_FILTER` below is its classic BPF
/// rendition.
pub const CAPTURE_FILTER: &str = "udp and (dst port 68) or (dst port 67)";

// Assembled from the pcap expression above: IPv4, UDP, not a fragment,
// destination port 68 or 67.
const DHCP_FILTER: [libc::sock_filter; 12] = [
    libc::sock_filter { code: 0x28, jt: 0, jf: 0, k: 12 },
    libc::sock_filter { code: 0x15, jt: 0, jf: 8, k: 0x0800 },
    libc::sock_filter { code: 0x30, jt: 0, jf: 0, k: 23 },
    libc::sock_filter { code: 0x15, jt: 0, jf: 6, k: 17 },
    libc::sock_filter { code: 0x28, jt: 0, jf: 0, k: 20 },
    libc::sock_filter { code: 0x45, jt: 4, jf: 0, k: 0x1fff },
    libc::sock_filter { code: 0xb1, jt: 0, jf: 0, k: 14 },
    libc::sock_filter { code: 0x48, jt: 0, jf: 0, k: 16 },
    libc::sock_filter { code: 0x15, jt: 2, jf: 0, k: 68 },
    libc::sock_filter { code: 0x15, jt: 1, jf: 0, k: 67 },
    libc::sock_filter { code: 0x06, jt: 0, jf: 0, k: 0 },
    libc::sock_filter { code: 0x06, jt: 0, jf: 0, k: 0x0004_0000 },
];

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

/// Resolve an interface name to its kernel index.
pub fn ifindex(name: &str) -> io::Result<i32> {
    let cname = CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name with NUL"))?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 {
        Err(last_error())
    } else {
        Ok(idx as i32)
    }
}

/// Read the first IPv4 address of an interface, if it has one.
pub fn interface_ipv4(name: &str) -> Option<Ipv4Addr> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return None;
    }
    let mut ifr: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes().iter()) {
        *dst = *src as libc::c_char;
    }
    if name.as_bytes().len() >= ifr.ifr_name.len() {
        unsafe { libc::close(fd) };
        return None;
    }
    let rc = unsafe { libc::ioctl(fd, libc::SIOCGIFADDR, &mut ifr) };
    unsafe { libc::close(fd) };
    if rc != 0 {
        return None;
    }
    let addr = unsafe { *(&ifr.ifr_ifru.ifru_addr as *const libc::sockaddr as *const libc::sockaddr_in) };
    Some(Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)))
}

/// An AF_PACKET socket bound to one interface.
pub struct PacketSocket {
    sock: Socket,
}

impl PacketSocket {
    /// Open the capture socket for a bridge: promiscuous, filtered down to
    /// DHCP, non-blocking.
    pub fn capture(name: &str) -> io::Result<Self> {
        let this = Self::open(name)?;
        this.join_promiscuous(ifindex(name)?)?;
        this.attach_filter()?;
        Ok(this)
    }

    /// Open the transmit socket for a trusted port: bound and non-blocking,
    /// no filter, no promiscuous membership.
    pub fn transmit(name: &str) -> io::Result<Self> {
        Self::open(name)
    }

    fn open(name: &str) -> io::Result<Self> {
        let proto = (libc::ETH_P_ALL as u16).to_be() as i32;
        let sock = Socket::new(Domain::PACKET, Type::RAW, Some(Protocol::from(proto)))?;

        let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        sll.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        sll.sll_ifindex = ifindex(name)?;
        let rc = unsafe {
            libc::bind(
                sock.as_raw_fd(),
                &sll as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(last_error());
        }
        sock.set_nonblocking(true)?;
        Ok(PacketSocket { sock })
    }

    fn join_promiscuous(&self, ifindex: i32) -> io::Result<()> {
        let mut mreq: libc::packet_mreq = unsafe { mem::zeroed() };
        mreq.mr_ifindex = ifindex;
        mreq.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;
        let rc = unsafe {
            libc::setsockopt(
                self.sock.as_raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                &mreq as *const libc::packet_mreq as *const libc::c_void,
                mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            Err(last_error())
        } else {
            Ok(())
        }
    }

    fn attach_filter(&self) -> io::Result<()> {
        let prog = libc::sock_fprog {
            len: DHCP_FILTER.len() as libc::c_ushort,
            filter: DHCP_FILTER.as_ptr() as *mut libc::sock_filter,
        };
        let rc = unsafe {
            libc::setsockopt(
                self.sock.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const libc::sock_fprog as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            Err(last_error())
        } else {
            Ok(())
        }
    }

    /// Read one frame; `WouldBlock` when the socket is drained.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let rc = unsafe {
            libc::recv(self.sock.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if rc < 0 {
            Err(last_error())
        } else {
            Ok(rc as usize)
        }
    }

    /// Write one frame; `WouldBlock` surfaces to the caller, which treats
    /// the frame as dropped.
    pub fn send(&self, frame: &[u8]) -> io::Result<usize> {
        let rc = unsafe {
            libc::send(self.sock.as_raw_fd(), frame.as_ptr() as *const libc::c_void, frame.len(), 0)
        };
        if rc < 0 {
            Err(last_error())
        } else {
            Ok(rc as usize)
        }
    }
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}
