//! Well-known port to service label mapping.

/// Short labels for well-known ports, used to annotate connections.
static SERVICES: &[(u16, &str)] = &[
    (20, "FTP-D"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "TELNET"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (80, "HTTP"),
    (110, "POP3"),
    (123, "NTP"),
    (143, "IMAP"),
    (161, "SNMP"),
    (162, "SNMP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (465, "SMTPS"),
    (514, "SYSLOG"),
    (587, "SMTP"),
    (636, "LDAPS"),
    (853, "DoT"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1080, "SOCKS"),
    (1194, "OVPN"),
    (1433, "MSSQL"),
    (1434, "MSSQL"),
    (1521, "ORACLE"),
    (1883, "MQTT"),
    (2049, "NFS"),
    (3306, "MYSQL"),
    (3389, "RDP"),
    (5353, "MDNS"),
    (5432, "PGSQL"),
    (5672, "AMQP"),
    (5900, "VNC"),
    (6379, "REDIS"),
    (6443, "K8S"),
    (8080, "HTTP-A"),
    (8443, "HTTPS"),
    (8883, "MQTTS"),
    (8888, "HTTP-A"),
    (9090, "PROM"),
    (9092, "KAFKA"),
    (9200, "ELAST"),
    (9300, "ELAST"),
    (11211, "MEMCD"),
    (27017, "MONGO"),
];

fn lookup(port: u16) -> Option<&'static str> {
    SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .ok()
        .map(|i| SERVICES[i].1)
}

/// Returns the service label for a connection.
///
/// The destination port is checked first, then the source port. Returns an
/// empty string when neither is known.
pub fn service_name(dst_port: u16, src_port: u16) -> &'static str {
    lookup(dst_port).or_else(|| lookup(src_port)).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_for_binary_search() {
        for w in SERVICES.windows(2) {
            assert!(w[0].0 < w[1].0, "{} >= {}", w[0].0, w[1].0);
        }
    }

    #[test]
    fn dst_port_wins() {
        assert_eq!(service_name(443, 22), "HTTPS");
    }

    #[test]
    fn falls_back_to_src_port() {
        assert_eq!(service_name(49152, 22), "SSH");
    }

    #[test]
    fn unknown_is_empty() {
        assert_eq!(service_name(49152, 49153), "");
    }

    #[test]
    fn common_ports() {
        assert_eq!(service_name(53, 0), "DNS");
        assert_eq!(service_name(5432, 0), "PGSQL");
        assert_eq!(service_name(6379, 0), "REDIS");
    }
}
