// ── Persisted settings record ──
//
// Fixed-size little-endian blob: magic + version header, the settings
// fields in declaration order, trailing 8-bit checksum. Strings occupy
// fixed-capacity fields with a leading length byte so the record size
// never varies. Decode is strict; any structural failure yields `None`
// and the caller falls back to factory defaults.

use std::net::Ipv4Addr;

use airlink_hal::{IpMode, ServiceMask, WifiMode};

use super::{
    EndpointConfig, HOSTNAME_MAX_LEN, PASSPHRASE_MAX_LEN, PASSWORD_MAX_LEN, SSID_MAX_LEN,
    WifiProfile, WifiSettings,
};

pub const RECORD_MAGIC: u32 = 0x5346_5741; // "AWFS" in the stored byte order
pub const RECORD_VERSION: u8 = 1;

const STR_FIELD_SSID: usize = 1 + SSID_MAX_LEN;
const STR_FIELD_PASSPHRASE: usize = 1 + PASSPHRASE_MAX_LEN;
const STR_FIELD_HOSTNAME: usize = 1 + HOSTNAME_MAX_LEN;
const STR_FIELD_PASSWORD: usize = 1 + PASSWORD_MAX_LEN;

// ip_mode + three addresses + hostname + four ports + service bits
const ENDPOINT_LEN: usize = 1 + 12 + STR_FIELD_HOSTNAME + 8 + 1;
const PROFILE_LEN: usize = STR_FIELD_SSID + STR_FIELD_PASSPHRASE + ENDPOINT_LEN;

/// Total record size: header, mode, both profiles, the two access
/// passwords and the checksum byte.
pub const RECORD_LEN: usize = 4 + 1 + 1 + 2 * PROFILE_LEN + 2 * STR_FIELD_PASSWORD + 1;

/// Serialize settings into a fresh record image.
pub fn encode(settings: &WifiSettings) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    let mut w = Writer {
        buf: &mut record,
        pos: 0,
    };

    w.put_bytes(&RECORD_MAGIC.to_le_bytes());
    w.put_u8(RECORD_VERSION);
    w.put_u8(settings.mode as u8);
    put_profile(&mut w, &settings.sta);
    put_profile(&mut w, &settings.ap);
    w.put_str(&settings.admin_password, PASSWORD_MAX_LEN);
    w.put_str(&settings.user_password, PASSWORD_MAX_LEN);

    record[RECORD_LEN - 1] = checksum8(&record[..RECORD_LEN - 1]);
    record
}

/// Deserialize and validate a record image.
pub fn decode(record: &[u8; RECORD_LEN]) -> Option<WifiSettings> {
    // Erased flash reads back as all ones.
    if record.iter().all(|&byte| byte == 0xFF) {
        return None;
    }
    if u32::from_le_bytes([record[0], record[1], record[2], record[3]]) != RECORD_MAGIC {
        return None;
    }
    if record[4] != RECORD_VERSION {
        return None;
    }
    if checksum8(&record[..RECORD_LEN - 1]) != record[RECORD_LEN - 1] {
        return None;
    }

    let mut r = Reader {
        buf: record,
        pos: 5,
    };
    let mode = WifiMode::from_u8(r.take_u8()?)?;
    let sta = take_profile(&mut r)?;
    let ap = take_profile(&mut r)?;
    let admin_password = r.take_str(PASSWORD_MAX_LEN)?;
    let user_password = r.take_str(PASSWORD_MAX_LEN)?;

    Some(WifiSettings {
        mode,
        sta,
        ap,
        admin_password,
        user_password,
    })
}

fn put_profile(w: &mut Writer<'_>, profile: &WifiProfile) {
    w.put_str(&profile.ssid, SSID_MAX_LEN);
    w.put_str(&profile.passphrase, PASSPHRASE_MAX_LEN);

    let network = &profile.network;
    w.put_u8(network.ip_mode as u8);
    w.put_ip(network.ip);
    w.put_ip(network.gateway);
    w.put_ip(network.mask);
    w.put_str(&network.hostname, HOSTNAME_MAX_LEN);
    w.put_u16(network.telnet_port);
    w.put_u16(network.http_port);
    w.put_u16(network.ftp_port);
    w.put_u16(network.websocket_port);
    w.put_u8(network.services.bits());
}

fn take_profile(r: &mut Reader<'_>) -> Option<WifiProfile> {
    let ssid = r.take_str(SSID_MAX_LEN)?;
    let passphrase = r.take_str(PASSPHRASE_MAX_LEN)?;

    let ip_mode = IpMode::from_u8(r.take_u8()?)?;
    let ip = r.take_ip()?;
    let gateway = r.take_ip()?;
    let mask = r.take_ip()?;
    let hostname = r.take_str(HOSTNAME_MAX_LEN)?;
    let telnet_port = r.take_u16()?;
    let http_port = r.take_u16()?;
    let ftp_port = r.take_u16()?;
    let websocket_port = r.take_u16()?;
    let services = ServiceMask::from_bits(r.take_u8()?);

    Some(WifiProfile {
        ssid,
        passphrase,
        network: EndpointConfig {
            ip_mode,
            ip,
            gateway,
            mask,
            hostname,
            telnet_port,
            http_port,
            ftp_port,
            websocket_port,
            services,
        },
    })
}

struct Writer<'a> {
    buf: &'a mut [u8; RECORD_LEN],
    pos: usize,
}

impl Writer<'_> {
    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    fn put_ip(&mut self, value: Ipv4Addr) {
        self.put_bytes(&value.octets());
    }

    /// Length byte plus `cap` data bytes, zero padded. Over-long input
    /// is clipped at a character boundary; bounds are enforced upstream
    /// so clipping only guards against a corrupted model.
    fn put_str(&mut self, value: &str, cap: usize) {
        let mut len = value.len().min(cap);
        while !value.is_char_boundary(len) {
            len -= 1;
        }
        let field = self.pos;
        // Field bytes start zeroed; only the prefix needs writing.
        self.buf[field] = len as u8;
        self.buf[field + 1..field + 1 + len].copy_from_slice(&value.as_bytes()[..len]);
        self.pos = field + 1 + cap;
    }
}

struct Reader<'a> {
    buf: &'a [u8; RECORD_LEN],
    pos: usize,
}

impl Reader<'_> {
    fn take_u8(&mut self) -> Option<u8> {
        let value = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(value)
    }

    fn take_u16(&mut self) -> Option<u16> {
        let bytes = self.buf.get(self.pos..self.pos + 2)?;
        self.pos += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn take_ip(&mut self) -> Option<Ipv4Addr> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
    }

    fn take_str(&mut self, cap: usize) -> Option<String> {
        let len = *self.buf.get(self.pos)? as usize;
        if len > cap {
            return None;
        }
        let data = self.buf.get(self.pos + 1..self.pos + 1 + len)?;
        let value = std::str::from_utf8(data).ok()?.to_string();
        self.pos += 1 + cap;
        Some(value)
    }
}

fn checksum8(bytes: &[u8]) -> u8 {
    let mut acc = 0x5Au8;
    for &byte in bytes {
        acc ^= byte.rotate_left(1);
    }
    acc
}
