//! Payment channels offered at checkout.

use serde::{Deserialize, Serialize};

use crate::macros::string_enum;

/// The channel the customer pays through.
///
/// `Any` leaves the choice to the gateway's hosted checkout page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    BcaVa,
    BniVa,
    BriVa,
    PermataVa,
    /// Mandiri bill payment.
    Echannel,
    Gopay,
    Shopeepay,
    Qris,
    #[default]
    Any,
}

string_enum!(PaymentChannel, "payment channel", {
    BcaVa => "bca_va",
    BniVa => "bni_va",
    BriVa => "bri_va",
    PermataVa => "permata_va",
    Echannel => "echannel",
    Gopay => "gopay",
    Shopeepay => "shopeepay",
    Qris => "qris",
    Any => "any",
});

impl PaymentChannel {
    /// Returns true for bank transfer channels (virtual accounts and bill payment).
    pub fn is_bank_transfer(&self) -> bool {
        matches!(
            self,
            PaymentChannel::BcaVa
                | PaymentChannel::BniVa
                | PaymentChannel::BriVa
                | PaymentChannel::PermataVa
                | PaymentChannel::Echannel
        )
    }

    /// Returns true for e-wallet channels.
    pub fn is_e_wallet(&self) -> bool {
        matches!(self, PaymentChannel::Gopay | PaymentChannel::Shopeepay)
    }
}
