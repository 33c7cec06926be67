//! Deterministic selector classification used whenever the remote model is unavailable.

use crate::assessment::{RiskAssessment, RiskLevel};
use crate::selector::FunctionSelector;

/// Selectors of token movement, ownership and proxy-upgrade functions.
pub const HIGH_RISK_SELECTORS: [(FunctionSelector, &str); 10] = [
    (FunctionSelector::new([0x23, 0xb8, 0x72, 0xdd]), "transferFrom(address,address,uint256)"),
    (FunctionSelector::new([0xa9, 0x05, 0x9c, 0xbb]), "transfer(address,uint256)"),
    (FunctionSelector::new([0x09, 0x5e, 0xa7, 0xb3]), "approve(address,uint256)"),
    (FunctionSelector::new([0x40, 0xc1, 0x0f, 0x19]), "mint(address,uint256)"),
    (FunctionSelector::new([0x42, 0x96, 0x6c, 0x68]), "burn(uint256)"),
    (FunctionSelector::new([0xf2, 0xfd, 0xe3, 0x8b]), "transferOwnership(address)"),
    (FunctionSelector::new([0x71, 0x50, 0x18, 0xa6]), "renounceOwnership()"),
    (FunctionSelector::new([0x5c, 0x60, 0xda, 0x1b]), "implementation()"),
    (FunctionSelector::new([0x36, 0x59, 0xcf, 0xe6]), "upgradeTo(address)"),
    (FunctionSelector::new([0x4f, 0x1e, 0xf2, 0x86]), "upgradeToAndCall(address,bytes)"),
];

/// Signature of a denylisted selector.
pub fn lookup(selector: &FunctionSelector) -> Option<&'static str> {
    HIGH_RISK_SELECTORS
        .iter()
        .find(|(candidate, _)| candidate == selector)
        .map(|(_, signature)| *signature)
}

pub fn classify_offline(selector: &FunctionSelector) -> RiskAssessment {
    match lookup(selector) {
        Some(signature) => RiskAssessment {
            risk: RiskLevel::High,
            safe: false,
            explanation: format!(
                "Selector {selector} matches {signature}, a common token transfer or contract \
                 control operation. Review the transaction details carefully."
            ),
            recommendation: "Review transaction details carefully. This could involve token \
                             transfers or contract control changes."
                .to_string(),
        },
        None => RiskAssessment {
            risk: RiskLevel::Low,
            safe: true,
            explanation: "Function selector appears to be a standard contract interaction. \
                          Always verify the contract address and transaction parameters."
                .to_string(),
            recommendation: "Function selector looks standard, but always verify the full \
                             transaction details before signing."
                .to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::parse_calldata_selector;

    #[test]
    fn transfer_is_high_risk() {
        let selector = parse_calldata_selector("0xA9059CBB").unwrap();
        let assessment = classify_offline(&selector);
        assert_eq!(assessment.risk, RiskLevel::High);
        assert!(!assessment.safe);
        assert!(assessment.explanation.contains("transfer(address,uint256)"));
    }

    #[test]
    fn every_entry_is_flagged() {
        for (selector, signature) in HIGH_RISK_SELECTORS {
            let assessment = classify_offline(&selector);
            assert!(!assessment.safe, "{signature}");
            assert_eq!(lookup(&selector), Some(signature));
        }
    }

    #[test]
    fn unknown_selector_is_low_risk() {
        let selector = parse_calldata_selector("0xa5d5db0c").unwrap();
        let assessment = classify_offline(&selector);
        assert_eq!(assessment.risk, RiskLevel::Low);
        assert!(assessment.safe);
    }
}
