use core::fmt;
use serde::{Deserialize, Serialize};

macro_rules! algorithms {
    ($(
        $(#[doc = $doc:tt])*
        $id:ident: $name:literal
    ),*) => {
        /// Signature algorithm.
        #[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Hash, Eq, Default)]
        pub enum Algorithm {
            $(
                $(#[doc = $doc])*
                #[serde(rename = $name)]
                $id,
            )*
            /// No signature.
            ///
            /// Per the specs it should only be `none` but `None` is kept for backwards
            /// compatibility.
            #[serde(alias = "None", rename = "none")]
            #[default]
            None
        }

        impl Algorithm {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(
                        Self::$id => $name,
                    )*
                    Self::None => "none"
                }
            }
        }

        impl std::str::FromStr for Algorithm {
            type Err = UnsupportedAlgorithm;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(
                        $name => Ok(Self::$id),
                    )*
                    "none" => Ok(Self::None),
                    other => Err(UnsupportedAlgorithm(other.to_owned()))
                }
            }
        }
    };
}

algorithms! {
    /// ECDSA using P-256 and SHA-256.
    ES256: "ES256",

    /// ECDSA using P-384 and SHA-384.
    ES384: "ES384",

    /// ECDSA using P-521 and SHA-512.
    ES512: "ES512"
}

impl Algorithm {
    /// Returns the name of the elliptic curve this algorithm operates on.
    pub fn curve(&self) -> Option<&'static str> {
        match self {
            Self::ES256 => Some("P-256"),
            Self::ES384 => Some("P-384"),
            Self::ES512 => Some("P-521"),
            Self::None => None,
        }
    }

    /// Returns the ECDSA algorithm associated with the given curve name.
    pub fn from_curve(curve: &str) -> Option<Self> {
        match curve {
            "P-256" => Some(Self::ES256),
            "P-384" => Some(Self::ES384),
            "P-521" => Some(Self::ES512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported algorithm `{0}`")]
pub struct UnsupportedAlgorithm(pub String);
