//! Name helpers shared by the CLI and the CDI generator

/// Replace characters that are unsafe in CDI names and file names
/// (`:`, `/`, `.`) with `-`
pub fn sanitize_name(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ':' | '/' | '.' => '-',
            c => c,
        })
        .collect()
}

/// Default resource name for a device selected by interface or PCI address.
///
/// The interface name wins when both are given.
pub fn derive_default_name(pci_address: &str, if_name: &str) -> String {
    if !if_name.is_empty() {
        return sanitize_name(if_name);
    }
    if !pci_address.is_empty() {
        return sanitize_name(&format!("pci-{pci_address}"));
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0000:17:00.0", "0000-17-00-0")]
    #[case("example.io/rdma", "example-io-rdma")]
    #[case("enp23s0f0np0", "enp23s0f0np0")]
    #[case("", "")]
    fn test_sanitize_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_name(input), expected);
    }

    #[rstest]
    #[case("0000:17:00.0", "", "pci-0000-17-00-0")]
    #[case("", "ib0", "ib0")]
    #[case("0000:17:00.0", "ib0.100", "ib0-100")]
    #[case("", "", "unknown")]
    fn test_derive_default_name(#[case] pci: &str, #[case] ifname: &str, #[case] expected: &str) {
        assert_eq!(derive_default_name(pci, ifname), expected);
    }
}
