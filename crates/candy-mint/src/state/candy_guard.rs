use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

use crate::constants::{DEFAULT_GROUP_LABEL, MAX_LABEL_LENGTH};
use crate::error::{MintError, Result};

/// 8 (discriminator) + 32 (base) + 1 (bump) + 32 (authority)
pub const HEADER_LEN: usize = 8 + 32 + 1 + 32;

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct BotTax {
    pub lamports: u64,
    pub last_instruction: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct SolPayment {
    pub lamports: u64,
    pub destination: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct TokenPayment {
    pub amount: u64,
    pub mint: Pubkey,
    pub destination_ata: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct StartDate {
    pub date: i64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct ThirdPartySigner {
    pub signer_key: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct TokenGate {
    pub amount: u64,
    pub mint: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct Gatekeeper {
    pub gatekeeper_network: Pubkey,
    pub expire_on_use: bool,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct EndDate {
    pub date: i64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct AllowList {
    pub merkle_root: [u8; 32],
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct MintLimit {
    pub id: u8,
    pub limit: u16,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct NftPayment {
    pub required_collection: Pubkey,
    pub destination: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct RedeemedAmount {
    pub maximum: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct AddressGate {
    pub address: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct NftGate {
    pub required_collection: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct NftBurn {
    pub required_collection: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct TokenBurn {
    pub amount: u64,
    pub mint: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct FreezeSolPayment {
    pub lamports: u64,
    pub destination: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct FreezeTokenPayment {
    pub amount: u64,
    pub mint: Pubkey,
    pub destination_ata: Pubkey,
}

/// Up to five extra programs allowed in the mint transaction.
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct ProgramGate {
    pub additional: Vec<Pubkey>,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct Allocation {
    pub id: u8,
    pub limit: u32,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
#[borsh(crate = "borsh")]
pub struct Token2022Payment {
    pub amount: u64,
    pub mint: Pubkey,
    pub destination_ata: Pubkey,
}

// ---------------------------------------------------------------------------
// GuardSet
// ---------------------------------------------------------------------------

/// Each enabled guard occupies a fixed-size slot after the `u64` feature mask,
/// in feature-bit order.
macro_rules! guard_set {
    ($( $bit:literal => $field:ident : $ty:ty [$size:expr] $name:literal ),* $(,)?) => {
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct GuardSet {
            $( pub $field: Option<$ty>, )*
        }

        impl GuardSet {
            /// Decodes a guard set and returns it with the number of bytes read.
            pub fn decode(data: &[u8]) -> std::result::Result<(Self, usize), String> {
                let features = data
                    .get(..8)
                    .map(|b| u64::from_le_bytes(b.try_into().unwrap_or([0; 8])))
                    .ok_or("missing feature flags")?;
                let known: u64 = 0 $( | (1u64 << $bit) )*;
                if features & !known != 0 {
                    return Err(format!("unknown guard flags {:#x}", features & !known));
                }

                let mut set = GuardSet::default();
                let mut offset = 8;
                $(
                    if features & (1u64 << $bit) != 0 {
                        let slot = data
                            .get(offset..offset + $size)
                            .ok_or(concat!($name, " guard is truncated"))?;
                        let guard = <$ty>::deserialize(&mut &slot[..])
                            .map_err(|e| format!("{}: {}", $name, e))?;
                        set.$field = Some(guard);
                        offset += $size;
                    }
                )*
                Ok((set, offset))
            }

            pub fn encode(&self) -> std::io::Result<Vec<u8>> {
                let mut features = 0u64;
                let mut body = Vec::new();
                $(
                    if let Some(guard) = &self.$field {
                        features |= 1u64 << $bit;
                        let mut bytes = borsh::to_vec(guard)?;
                        bytes.resize($size, 0);
                        body.extend_from_slice(&bytes);
                    }
                )*
                let mut out = features.to_le_bytes().to_vec();
                out.extend_from_slice(&body);
                Ok(out)
            }

            /// Fills every guard this set leaves unset from `default`.
            pub fn merge(&self, default: &GuardSet) -> GuardSet {
                GuardSet {
                    $( $field: self.$field.clone().or_else(|| default.$field.clone()), )*
                }
            }

            pub fn enabled(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push($name);
                    }
                )*
                names
            }
        }
    };
}

guard_set! {
    0 => bot_tax: BotTax [9] "botTax",
    1 => sol_payment: SolPayment [40] "solPayment",
    2 => token_payment: TokenPayment [72] "tokenPayment",
    3 => start_date: StartDate [8] "startDate",
    4 => third_party_signer: ThirdPartySigner [32] "thirdPartySigner",
    5 => token_gate: TokenGate [40] "tokenGate",
    6 => gatekeeper: Gatekeeper [33] "gatekeeper",
    7 => end_date: EndDate [8] "endDate",
    8 => allow_list: AllowList [32] "allowList",
    9 => mint_limit: MintLimit [3] "mintLimit",
    10 => nft_payment: NftPayment [64] "nftPayment",
    11 => redeemed_amount: RedeemedAmount [8] "redeemedAmount",
    12 => address_gate: AddressGate [32] "addressGate",
    13 => nft_gate: NftGate [32] "nftGate",
    14 => nft_burn: NftBurn [32] "nftBurn",
    15 => token_burn: TokenBurn [40] "tokenBurn",
    16 => freeze_sol_payment: FreezeSolPayment [40] "freezeSolPayment",
    17 => freeze_token_payment: FreezeTokenPayment [72] "freezeTokenPayment",
    18 => program_gate: ProgramGate [4 + 5 * 32] "programGate",
    19 => allocation: Allocation [5] "allocation",
    20 => token2022_payment: Token2022Payment [72] "token2022Payment",
}

/// Route-able guard indices, in feature-bit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardType {
    AllowList = 8,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardGroup {
    pub label: String,
    pub guards: GuardSet,
}

impl GuardGroup {
    pub fn is_default(&self) -> bool {
        self.label == DEFAULT_GROUP_LABEL
    }

    /// Instruction label argument; the default set is addressed without one.
    pub fn instruction_label(&self) -> Option<String> {
        if self.is_default() {
            None
        } else {
            Some(self.label.clone())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandyGuardAccount {
    pub base: Pubkey,
    pub bump: u8,
    pub authority: Pubkey,
    pub default: GuardSet,
    pub groups: Vec<GuardGroup>,
}

pub fn account_discriminator() -> [u8; 8] {
    let hash = solana_sdk::hash::hash(b"account:CandyGuard");
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash.to_bytes()[..8]);
    out
}

fn label_from_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl CandyGuardAccount {
    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self> {
        let err = |reason: String| MintError::decode("candy guard", *address, reason);

        if data.len() < HEADER_LEN || data[..8] != account_discriminator() {
            return Err(err("not a candy guard account".into()));
        }
        let base = Pubkey::try_from(&data[8..40]).map_err(|e| err(e.to_string()))?;
        let bump = data[40];
        let authority = Pubkey::try_from(&data[41..73]).map_err(|e| err(e.to_string()))?;

        let mut offset = HEADER_LEN;
        let (default, read) = GuardSet::decode(&data[offset..]).map_err(err)?;
        offset += read;

        let group_count = data
            .get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0);
        offset += 4;

        // Every group takes at least its label plus the feature flags.
        let room = data.len().saturating_sub(offset) / (MAX_LABEL_LENGTH + 8);
        let mut groups = Vec::with_capacity((group_count as usize).min(room));
        for _ in 0..group_count {
            let label = data
                .get(offset..offset + MAX_LABEL_LENGTH)
                .map(label_from_bytes)
                .ok_or_else(|| err("group label is truncated".into()))?;
            offset += MAX_LABEL_LENGTH;
            let (guards, read) = GuardSet::decode(&data[offset..]).map_err(err)?;
            offset += read;
            groups.push(GuardGroup { label, guards });
        }

        Ok(Self {
            base,
            bump,
            authority,
            default,
            groups,
        })
    }

    pub fn to_account_data(&self) -> std::io::Result<Vec<u8>> {
        let mut out = account_discriminator().to_vec();
        out.extend_from_slice(self.base.as_ref());
        out.push(self.bump);
        out.extend_from_slice(self.authority.as_ref());
        out.extend(self.default.encode()?);
        out.extend_from_slice(&(self.groups.len() as u32).to_le_bytes());
        for group in &self.groups {
            let mut label = [0u8; MAX_LABEL_LENGTH];
            let bytes = group.label.as_bytes();
            let len = bytes.len().min(MAX_LABEL_LENGTH);
            label[..len].copy_from_slice(&bytes[..len]);
            out.extend_from_slice(&label);
            out.extend(group.guards.encode()?);
        }
        Ok(out)
    }

    /// The default set followed by every group, each with the default set
    /// merged in under it.
    pub fn effective_groups(&self) -> Vec<GuardGroup> {
        let mut out = vec![GuardGroup {
            label: DEFAULT_GROUP_LABEL.to_string(),
            guards: self.default.clone(),
        }];
        out.extend(self.groups.iter().map(|g| GuardGroup {
            label: g.label.clone(),
            guards: g.guards.merge(&self.default),
        }));
        out
    }

    pub fn effective_group(&self, label: &str) -> Option<GuardGroup> {
        self.effective_groups().into_iter().find(|g| g.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CandyGuardAccount {
        CandyGuardAccount {
            base: Pubkey::new_unique(),
            bump: 254,
            authority: Pubkey::new_unique(),
            default: GuardSet {
                sol_payment: Some(SolPayment {
                    lamports: 100_000_000,
                    destination: Pubkey::new_unique(),
                }),
                token_burn: Some(TokenBurn {
                    amount: 1,
                    mint: Pubkey::new_unique(),
                }),
                ..Default::default()
            },
            groups: vec![
                GuardGroup {
                    label: "WL".into(),
                    guards: GuardSet {
                        allow_list: Some(AllowList { merkle_root: [7; 32] }),
                        mint_limit: Some(MintLimit { id: 1, limit: 2 }),
                        program_gate: Some(ProgramGate {
                            additional: vec![Pubkey::new_unique()],
                        }),
                        ..Default::default()
                    },
                },
                GuardGroup {
                    label: "public".into(),
                    guards: GuardSet {
                        start_date: Some(StartDate { date: 1_700_000_000 }),
                        token_burn: Some(TokenBurn {
                            amount: 5,
                            mint: Pubkey::new_unique(),
                        }),
                        ..Default::default()
                    },
                },
            ],
        }
    }

    #[test]
    fn decodes_groups_and_slots() {
        let account = sample();
        let address = Pubkey::new_unique();
        let data = account.to_account_data().unwrap();
        let decoded = CandyGuardAccount::decode(&address, &data).unwrap();
        assert_eq!(decoded, account);
        assert_eq!(decoded.groups[0].guards.enabled(), vec!["allowList", "mintLimit", "programGate"]);
    }

    #[test]
    fn slot_sizes_are_fixed() {
        let set = GuardSet {
            mint_limit: Some(MintLimit { id: 3, limit: 9 }),
            allocation: Some(Allocation { id: 1, limit: 50 }),
            ..Default::default()
        };
        assert_eq!(set.encode().unwrap().len(), 8 + 3 + 5);
    }

    #[test]
    fn group_guard_wins_over_default() {
        let account = sample();
        let groups = account.effective_groups();
        assert_eq!(groups[0].label, "default");

        let wl = &groups[1];
        assert!(wl.guards.allow_list.is_some());
        // Inherited from the default set.
        assert_eq!(wl.guards.token_burn, account.default.token_burn);
        assert_eq!(wl.guards.sol_payment, account.default.sol_payment);

        let public = &groups[2];
        assert_eq!(public.guards.token_burn.as_ref().unwrap().amount, 5);
    }

    #[test]
    fn rejects_wrong_discriminator() {
        let mut data = sample().to_account_data().unwrap();
        data[0] ^= 0xff;
        let err = CandyGuardAccount::decode(&Pubkey::new_unique(), &data).unwrap_err();
        assert!(matches!(err, MintError::Decode { .. }));
    }

    #[test]
    fn oversized_group_count_is_truncation_not_allocation() {
        let mut account = sample();
        account.groups.clear();
        let mut data = account.to_account_data().unwrap();
        let at = data.len() - 4;
        data[at..].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = CandyGuardAccount::decode(&Pubkey::new_unique(), &data).unwrap_err();
        assert!(err.to_string().contains("group label is truncated"));
    }

    #[test]
    fn rejects_unknown_guard_flags() {
        let mut data = (1u64 << 40).to_le_bytes().to_vec();
        data.extend_from_slice(&[0; 64]);
        assert!(GuardSet::decode(&data).is_err());
    }

    #[test]
    fn default_label_has_no_instruction_label() {
        let groups = sample().effective_groups();
        assert_eq!(groups[0].instruction_label(), None);
        assert_eq!(groups[1].instruction_label(), Some("WL".to_string()));
    }
}
