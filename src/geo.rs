//! Embedded IPv4 geolocation.
//!
//! A static range table covering major cloud providers, CDNs, and common
//! country allocations. No external database, no network access: this is a
//! coarse hint for the remote-hosts view, not an authority.

use std::net::{IpAddr, Ipv4Addr};

/// Country code with a flag, as shown in the remote-hosts view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountryInfo {
    /// Two-letter code (e.g. `US`), or a special tag (`LAN`, `LO`, `MC`).
    /// Empty when unknown.
    pub code: &'static str,
}

impl CountryInfo {
    const fn new(code: &'static str) -> Self {
        Self { code }
    }

    /// Flag emoji for the code. Special tags get pictographs.
    pub fn flag(&self) -> String {
        match self.code {
            "" => String::new(),
            "LAN" | "LO" => "🏠".to_string(),
            "MC" => "📡".to_string(),
            code if code.len() == 2 => {
                let b = code.as_bytes();
                // Regional indicator symbols start at U+1F1E6 ('A').
                let r1 = char::from_u32(0x1F1E6 + (b[0] - b'A') as u32);
                let r2 = char::from_u32(0x1F1E6 + (b[1] - b'A') as u32);
                match (r1, r2) {
                    (Some(a), Some(b)) => format!("{a}{b}"),
                    _ => "🌐".to_string(),
                }
            }
            _ => "🌐".to_string(),
        }
    }

    /// Renders `"<flag> <code>"`, or empty when unknown.
    pub fn format(&self) -> String {
        if self.code.is_empty() {
            return String::new();
        }
        format!("{} {}", self.flag(), self.code)
    }
}

/// Looks up the country for an address.
///
/// Private ranges (RFC1918, CGNAT, link-local) map to `LAN`, loopback to
/// `LO`, multicast to `MC`. Otherwise the smallest containing range wins.
/// IPv6 and unmatched addresses return the empty [`CountryInfo`].
pub fn lookup(ip: IpAddr) -> CountryInfo {
    let v4 = match ip {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return CountryInfo::default(),
    };

    if is_private(v4) {
        return CountryInfo::new("LAN");
    }
    if v4.is_loopback() {
        return CountryInfo::new("LO");
    }
    if v4.is_multicast() {
        return CountryInfo::new("MC");
    }

    let n = u32::from(v4);
    let mut best: Option<&IpRange> = None;
    for r in RANGES {
        if n >= r.start && n <= r.end {
            let better = match best {
                Some(b) => (r.end - r.start) < (b.end - b.start),
                None => true,
            };
            if better {
                best = Some(r);
            }
        }
    }

    best.map(|r| CountryInfo::new(r.country)).unwrap_or_default()
}

fn is_private(ip: Ipv4Addr) -> bool {
    let n = u32::from(ip);
    const PRIVATE: &[(u32, u32)] = &[
        (ip4(10, 0, 0, 0), 0xFF00_0000),    // 10/8
        (ip4(172, 16, 0, 0), 0xFFF0_0000),  // 172.16/12
        (ip4(192, 168, 0, 0), 0xFFFF_0000), // 192.168/16
        (ip4(100, 64, 0, 0), 0xFFC0_0000),  // CGNAT
        (ip4(169, 254, 0, 0), 0xFFFF_0000), // link-local
    ];
    PRIVATE.iter().any(|&(net, mask)| n & mask == net)
}

struct IpRange {
    start: u32,
    end: u32,
    country: &'static str,
}

const fn ip4(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) << 24 | (b as u32) << 16 | (c as u32) << 8 | d as u32
}

const fn range(
    s: (u8, u8, u8, u8),
    e: (u8, u8, u8, u8),
    country: &'static str,
) -> IpRange {
    IpRange {
        start: ip4(s.0, s.1, s.2, s.3),
        end: ip4(e.0, e.1, e.2, e.3),
        country,
    }
}

/// Range table, cloud/CDN providers first, then coarse country allocations.
static RANGES: &[IpRange] = &[
    // Google (US)
    range((8, 8, 4, 0), (8, 8, 8, 255), "US"),
    range((8, 34, 208, 0), (8, 35, 207, 255), "US"),
    range((34, 0, 0, 0), (34, 127, 255, 255), "US"),
    range((35, 184, 0, 0), (35, 199, 255, 255), "US"),
    range((64, 233, 160, 0), (64, 233, 191, 255), "US"),
    range((66, 102, 0, 0), (66, 102, 15, 255), "US"),
    range((66, 249, 64, 0), (66, 249, 95, 255), "US"),
    range((72, 14, 192, 0), (72, 14, 255, 255), "US"),
    range((74, 125, 0, 0), (74, 125, 255, 255), "US"),
    range((142, 250, 0, 0), (142, 251, 255, 255), "US"),
    range((172, 217, 0, 0), (172, 217, 255, 255), "US"),
    range((173, 194, 0, 0), (173, 194, 255, 255), "US"),
    range((209, 85, 128, 0), (209, 85, 255, 255), "US"),
    range((216, 58, 192, 0), (216, 58, 223, 255), "US"),
    // Amazon AWS (US)
    range((3, 0, 0, 0), (3, 127, 255, 255), "US"),
    range((13, 32, 0, 0), (13, 35, 255, 255), "US"),
    range((13, 224, 0, 0), (13, 255, 255, 255), "US"),
    range((52, 0, 0, 0), (52, 95, 255, 255), "US"),
    range((54, 64, 0, 0), (54, 95, 255, 255), "US"),
    range((54, 144, 0, 0), (54, 255, 255, 255), "US"),
    // Microsoft / Azure (US)
    range((13, 64, 0, 0), (13, 107, 255, 255), "US"),
    range((20, 0, 0, 0), (20, 63, 255, 255), "US"),
    range((40, 64, 0, 0), (40, 127, 255, 255), "US"),
    range((52, 96, 0, 0), (52, 191, 255, 255), "US"),
    range((104, 40, 0, 0), (104, 47, 255, 255), "US"),
    range((204, 79, 195, 0), (204, 79, 197, 255), "US"),
    // Cloudflare (US)
    range((1, 0, 0, 0), (1, 1, 1, 255), "US"),
    range((104, 16, 0, 0), (104, 31, 255, 255), "US"),
    range((172, 64, 0, 0), (172, 71, 255, 255), "US"),
    range((188, 114, 96, 0), (188, 114, 99, 255), "US"),
    range((198, 41, 128, 0), (198, 41, 255, 255), "US"),
    // Meta (US)
    range((31, 13, 24, 0), (31, 13, 31, 255), "US"),
    range((157, 240, 0, 0), (157, 240, 255, 255), "US"),
    range((179, 60, 192, 0), (179, 60, 195, 255), "US"),
    // Akamai (US)
    range((23, 0, 0, 0), (23, 79, 255, 255), "US"),
    range((104, 64, 0, 0), (104, 127, 255, 255), "US"),
    // Apple (US)
    range((17, 0, 0, 0), (17, 255, 255, 255), "US"),
    // Germany
    range((5, 1, 0, 0), (5, 1, 127, 255), "DE"),
    range((46, 0, 0, 0), (46, 0, 255, 255), "DE"),
    range((78, 46, 0, 0), (78, 47, 255, 255), "DE"),
    range((85, 13, 128, 0), (85, 13, 255, 255), "DE"),
    range((195, 50, 140, 0), (195, 50, 143, 255), "DE"),
    // United Kingdom
    range((2, 16, 0, 0), (2, 31, 255, 255), "GB"),
    range((5, 62, 0, 0), (5, 63, 255, 255), "GB"),
    range((51, 0, 0, 0), (51, 15, 255, 255), "GB"),
    // France
    range((2, 0, 0, 0), (2, 15, 255, 255), "FR"),
    range((5, 39, 0, 0), (5, 39, 127, 255), "FR"),
    range((51, 68, 0, 0), (51, 79, 255, 255), "FR"),
    range((91, 134, 0, 0), (91, 134, 255, 255), "FR"),
    // Netherlands
    range((5, 2, 0, 0), (5, 2, 255, 255), "NL"),
    range((31, 3, 0, 0), (31, 3, 255, 255), "NL"),
    range((37, 48, 0, 0), (37, 63, 255, 255), "NL"),
    range((178, 162, 0, 0), (178, 162, 255, 255), "NL"),
    // Japan
    range((1, 0, 16, 0), (1, 0, 31, 255), "JP"),
    range((27, 0, 0, 0), (27, 15, 255, 255), "JP"),
    range((36, 2, 0, 0), (36, 3, 255, 255), "JP"),
    range((49, 212, 0, 0), (49, 213, 255, 255), "JP"),
    range((103, 5, 140, 0), (103, 5, 143, 255), "JP"),
    range((133, 0, 0, 0), (133, 255, 255, 255), "JP"),
    range((210, 0, 0, 0), (210, 255, 255, 255), "JP"),
    // China
    range((1, 0, 1, 0), (1, 0, 3, 255), "CN"),
    range((14, 0, 0, 0), (14, 31, 255, 255), "CN"),
    range((36, 0, 0, 0), (36, 1, 255, 255), "CN"),
    range((42, 0, 0, 0), (42, 127, 255, 255), "CN"),
    range((58, 0, 0, 0), (58, 63, 255, 255), "CN"),
    range((101, 0, 0, 0), (101, 127, 255, 255), "CN"),
    range((106, 0, 0, 0), (106, 127, 255, 255), "CN"),
    range((110, 0, 0, 0), (110, 255, 255, 255), "CN"),
    range((111, 0, 0, 0), (111, 255, 255, 255), "CN"),
    range((112, 0, 0, 0), (112, 127, 255, 255), "CN"),
    range((114, 0, 0, 0), (114, 127, 255, 255), "CN"),
    range((116, 0, 0, 0), (116, 127, 255, 255), "CN"),
    range((119, 0, 0, 0), (119, 63, 255, 255), "CN"),
    range((120, 0, 0, 0), (120, 127, 255, 255), "CN"),
    range((121, 0, 0, 0), (121, 127, 255, 255), "CN"),
    range((122, 0, 0, 0), (122, 127, 255, 255), "CN"),
    range((123, 0, 0, 0), (123, 127, 255, 255), "CN"),
    range((124, 0, 0, 0), (124, 127, 255, 255), "CN"),
    range((125, 0, 0, 0), (125, 127, 255, 255), "CN"),
    range((180, 76, 0, 0), (180, 76, 255, 255), "CN"),
    range((182, 0, 0, 0), (182, 127, 255, 255), "CN"),
    range((183, 0, 0, 0), (183, 255, 255, 255), "CN"),
    range((202, 96, 0, 0), (202, 111, 255, 255), "CN"),
    range((218, 0, 0, 0), (218, 127, 255, 255), "CN"),
    range((220, 0, 0, 0), (220, 255, 255, 255), "CN"),
    range((221, 0, 0, 0), (221, 255, 255, 255), "CN"),
    range((222, 0, 0, 0), (222, 255, 255, 255), "CN"),
    range((223, 0, 0, 0), (223, 255, 255, 255), "CN"),
    // South Korea
    range((1, 11, 0, 0), (1, 11, 255, 255), "KR"),
    range((14, 32, 0, 0), (14, 63, 255, 255), "KR"),
    range((27, 96, 0, 0), (27, 127, 255, 255), "KR"),
    range((39, 0, 0, 0), (39, 15, 255, 255), "KR"),
    range((58, 64, 0, 0), (58, 79, 255, 255), "KR"),
    range((112, 128, 0, 0), (112, 191, 255, 255), "KR"),
    range((175, 192, 0, 0), (175, 223, 255, 255), "KR"),
    range((211, 0, 0, 0), (211, 63, 255, 255), "KR"),
    // India
    range((14, 96, 0, 0), (14, 143, 255, 255), "IN"),
    range((27, 56, 0, 0), (27, 63, 255, 255), "IN"),
    range((43, 224, 0, 0), (43, 255, 255, 255), "IN"),
    range((49, 32, 0, 0), (49, 47, 255, 255), "IN"),
    range((103, 0, 0, 0), (103, 5, 139, 255), "IN"),
    range((117, 192, 0, 0), (117, 255, 255, 255), "IN"),
    // Russia
    range((5, 3, 0, 0), (5, 3, 255, 255), "RU"),
    range((5, 8, 0, 0), (5, 8, 255, 255), "RU"),
    range((31, 13, 0, 0), (31, 13, 23, 255), "RU"),
    range((46, 8, 0, 0), (46, 8, 255, 255), "RU"),
    range((77, 88, 0, 0), (77, 88, 63, 255), "RU"),
    range((87, 240, 0, 0), (87, 240, 255, 255), "RU"),
    range((93, 158, 0, 0), (93, 158, 255, 255), "RU"),
    range((95, 163, 0, 0), (95, 163, 255, 255), "RU"),
    range((185, 32, 0, 0), (185, 32, 127, 255), "RU"),
    range((213, 180, 0, 0), (213, 180, 255, 255), "RU"),
    // Brazil
    range((45, 160, 0, 0), (45, 175, 255, 255), "BR"),
    range((131, 0, 0, 0), (131, 0, 255, 255), "BR"),
    range((177, 0, 0, 0), (177, 127, 255, 255), "BR"),
    range((179, 0, 0, 0), (179, 60, 191, 255), "BR"),
    range((186, 192, 0, 0), (186, 255, 255, 255), "BR"),
    range((187, 0, 0, 0), (187, 127, 255, 255), "BR"),
    range((189, 0, 0, 0), (189, 127, 255, 255), "BR"),
    range((200, 0, 0, 0), (200, 255, 255, 255), "BR"),
    range((201, 0, 0, 0), (201, 63, 255, 255), "BR"),
    // Australia
    range((1, 0, 4, 0), (1, 0, 7, 255), "AU"),
    range((1, 40, 0, 0), (1, 47, 255, 255), "AU"),
    range((27, 32, 0, 0), (27, 55, 255, 255), "AU"),
    range((43, 224, 0, 0), (43, 239, 255, 255), "AU"),
    range((49, 176, 0, 0), (49, 191, 255, 255), "AU"),
    range((101, 128, 0, 0), (101, 191, 255, 255), "AU"),
    range((103, 128, 0, 0), (103, 143, 255, 255), "AU"),
    range((203, 0, 0, 0), (203, 63, 255, 255), "AU"),
    // Canada
    range((24, 48, 0, 0), (24, 63, 255, 255), "CA"),
    range((67, 68, 0, 0), (67, 71, 255, 255), "CA"),
    range((99, 224, 0, 0), (99, 255, 255, 255), "CA"),
    range((142, 0, 0, 0), (142, 3, 255, 255), "CA"),
    range((192, 206, 0, 0), (192, 206, 255, 255), "CA"),
    range((199, 7, 0, 0), (199, 7, 255, 255), "CA"),
    // Singapore
    range((1, 32, 0, 0), (1, 39, 255, 255), "SG"),
    range((13, 212, 0, 0), (13, 215, 255, 255), "SG"),
    range((27, 124, 0, 0), (27, 125, 255, 255), "SG"),
    range((43, 128, 0, 0), (43, 159, 255, 255), "SG"),
    range((49, 128, 0, 0), (49, 143, 255, 255), "SG"),
    range((52, 74, 0, 0), (52, 77, 255, 255), "SG"),
    range((54, 169, 0, 0), (54, 169, 255, 255), "SG"),
    range((103, 6, 0, 0), (103, 7, 255, 255), "SG"),
    range((175, 41, 128, 0), (175, 41, 191, 255), "SG"),
    // Vietnam
    range((1, 52, 0, 0), (1, 55, 255, 255), "VN"),
    range((14, 160, 0, 0), (14, 191, 255, 255), "VN"),
    range((27, 64, 0, 0), (27, 79, 255, 255), "VN"),
    range((42, 112, 0, 0), (42, 119, 255, 255), "VN"),
    range((43, 239, 0, 0), (43, 239, 255, 255), "VN"),
    range((49, 156, 0, 0), (49, 159, 255, 255), "VN"),
    range((58, 186, 0, 0), (58, 187, 255, 255), "VN"),
    range((103, 1, 0, 0), (103, 1, 255, 255), "VN"),
    range((113, 160, 0, 0), (113, 191, 255, 255), "VN"),
    range((115, 72, 0, 0), (115, 79, 255, 255), "VN"),
    range((171, 224, 0, 0), (171, 255, 255, 255), "VN"),
    range((180, 148, 0, 0), (180, 148, 255, 255), "VN"),
    range((203, 113, 0, 0), (203, 113, 255, 255), "VN"),
    range((203, 162, 0, 0), (203, 162, 255, 255), "VN"),
    range((210, 86, 0, 0), (210, 86, 255, 255), "VN"),
];
