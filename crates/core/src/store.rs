//! Table layouts of the paymaster world's store.
//!
//! Records are addressed by a 32-byte resource id and a tuple of 32-byte key
//! words. Only static fields are used by the relay, so a record is decoded by
//! slicing `staticData` by field width.

use alloy_primitives::{Address, B256, U256};

/// Kind prefix of a resource id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Table,
    Namespace,
}

impl ResourceType {
    const fn tag(self) -> [u8; 2] {
        match self {
            Self::Table => *b"tb",
            Self::Namespace => *b"ns",
        }
    }
}

/// `bytes2 type ‖ bytes14 namespace ‖ bytes16 name`. Longer names are truncated.
pub fn resource_id(kind: ResourceType, namespace: &str, name: &str) -> B256 {
    let mut id = [0u8; 32];
    id[..2].copy_from_slice(&kind.tag());
    let ns = namespace.as_bytes();
    let ns_len = ns.len().min(14);
    id[2..2 + ns_len].copy_from_slice(&ns[..ns_len]);
    let name = name.as_bytes();
    let name_len = name.len().min(16);
    id[16..16 + name_len].copy_from_slice(&name[..name_len]);
    B256::from(id)
}

/// Resource id of a namespace.
pub fn namespace_id(namespace: &str) -> B256 {
    resource_id(ResourceType::Namespace, namespace, "")
}

/// Left-pads an address into a key word.
pub fn address_key(address: Address) -> B256 {
    address.into_word()
}

/// Static ABI types a field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    /// `uintN`, with N in bits.
    Uint(u16),
    /// `bytesN`, with N in bytes.
    Bytes(u8),
    Bool,
    Address,
}

impl SchemaType {
    /// Width of the field in packed static data.
    pub const fn static_len(self) -> usize {
        match self {
            Self::Uint(bits) => bits as usize / 8,
            Self::Bytes(len) => len as usize,
            Self::Bool => 1,
            Self::Address => 20,
        }
    }

    /// Type id used in encoded schemas.
    pub const fn type_id(self) -> u8 {
        match self {
            Self::Uint(bits) => (bits / 8 - 1) as u8,
            Self::Bytes(len) => 63 + len,
            Self::Bool => 96,
            Self::Address => 97,
        }
    }

    /// Packs an unsigned value into this field's width, big-endian.
    pub fn encode_uint(self, value: U256) -> Vec<u8> {
        let word = value.to_be_bytes::<32>();
        word[32 - self.static_len()..].to_vec()
    }
}

/// A named column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: SchemaType,
}

const fn field(name: &'static str, ty: SchemaType) -> Field {
    Field { name, ty }
}

const U256_FIELD: SchemaType = SchemaType::Uint(256);

/// A store table with static fields only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub namespace: String,
    pub name: &'static str,
    pub key: &'static [Field],
    pub value: &'static [Field],
}

impl Table {
    fn new(namespace: &str, name: &'static str, key: &'static [Field], value: &'static [Field]) -> Self {
        Self { namespace: namespace.to_owned(), name, key, value }
    }

    pub fn table_id(&self) -> B256 {
        resource_id(ResourceType::Table, &self.namespace, self.name)
    }

    fn static_len(&self) -> usize {
        self.value.iter().map(|f| f.ty.static_len()).sum()
    }

    /// `uint16 staticLength ‖ uint8 numStatic ‖ uint8 numDynamic ‖ uint8[] widths`.
    pub fn field_layout(&self) -> B256 {
        let mut word = [0u8; 32];
        word[..2].copy_from_slice(&(self.static_len() as u16).to_be_bytes());
        word[2] = self.value.len() as u8;
        word[3] = 0;
        for (slot, f) in word[4..].iter_mut().zip(self.value) {
            *slot = f.ty.static_len() as u8;
        }
        B256::from(word)
    }

    pub fn key_schema(&self) -> B256 {
        encode_schema(self.key)
    }

    pub fn value_schema(&self) -> B256 {
        encode_schema(self.value)
    }

    pub fn key_names(&self) -> Vec<String> {
        self.key.iter().map(|f| f.name.to_owned()).collect()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.value.iter().map(|f| f.name.to_owned()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<u8> {
        self.value.iter().position(|f| f.name == name).map(|i| i as u8)
    }

    /// Splits packed static data into one slice per value field. Missing
    /// trailing bytes read as zero, which is what the store returns for an
    /// unset record.
    pub fn decode_static(&self, data: &[u8]) -> StaticRecord {
        let mut padded = data.to_vec();
        padded.resize(self.static_len().max(data.len()), 0);

        let mut offset = 0;
        let fields = self
            .value
            .iter()
            .map(|f| {
                let len = f.ty.static_len();
                let slice = padded[offset..offset + len].to_vec();
                offset += len;
                slice
            })
            .collect();
        StaticRecord { fields }
    }
}

fn encode_schema(fields: &[Field]) -> B256 {
    let mut word = [0u8; 32];
    let static_len: usize = fields.iter().map(|f| f.ty.static_len()).sum();
    word[..2].copy_from_slice(&(static_len as u16).to_be_bytes());
    word[2] = fields.len() as u8;
    for (slot, f) in word[4..].iter_mut().zip(fields) {
        *slot = f.ty.type_id();
    }
    B256::from(word)
}

/// Decoded static fields of one record, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRecord {
    fields: Vec<Vec<u8>>,
}

impl StaticRecord {
    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|f| f.iter().all(|b| *b == 0))
    }

    pub fn uint(&self, index: usize) -> U256 {
        self.fields.get(index).map(|f| U256::from_be_slice(f)).unwrap_or_default()
    }

    pub fn address(&self, index: usize) -> Address {
        self.fields
            .get(index)
            .filter(|f| f.len() == 20)
            .map(|f| Address::from_slice(f))
            .unwrap_or_default()
    }

    pub fn bool(&self, index: usize) -> bool {
        self.fields.get(index).is_some_and(|f| f.first() == Some(&1))
    }
}

const ALLOWANCE_KEY: &[Field] = &[field("user", SchemaType::Address), field("sponsor", SchemaType::Address)];
const ALLOWANCE_VALUE: &[Field] = &[
    field("allowance", U256_FIELD),
    field("next", SchemaType::Address),
    field("previous", SchemaType::Address),
];
const USER_KEY: &[Field] = &[field("user", SchemaType::Address)];
const ALLOWANCE_LIST_VALUE: &[Field] =
    &[field("first", SchemaType::Address), field("length", U256_FIELD)];
const SPENDER_KEY: &[Field] = &[field("spender", SchemaType::Address)];
const SPENDER_VALUE: &[Field] = &[field("user", SchemaType::Address)];
const BALANCE_VALUE: &[Field] = &[field("balance", U256_FIELD)];
const PASS_KEY: &[Field] = &[field("passId", SchemaType::Bytes(32))];
const PASS_CONFIG_VALUE: &[Field] = &[
    field("claimAmount", U256_FIELD),
    field("claimInterval", U256_FIELD),
    field("validityPeriod", U256_FIELD),
    field("grantor", SchemaType::Address),
];
const PASS_HOLDER_KEY: &[Field] = &[field("user", SchemaType::Address), field("passId", SchemaType::Bytes(32))];
const PASS_HOLDER_VALUE: &[Field] = &[field("lastClaimed", U256_FIELD), field("lastRenewed", U256_FIELD)];
const GRANTS_VALUE: &[Field] = &[field("amount", U256_FIELD), field("updatedAt", SchemaType::Uint(32))];
const NAMESPACE_OWNER_KEY: &[Field] = &[field("namespaceId", SchemaType::Bytes(32))];
const NAMESPACE_OWNER_VALUE: &[Field] = &[field("owner", SchemaType::Address)];
const RESOURCE_IDS_KEY: &[Field] = &[field("resourceId", SchemaType::Bytes(32))];
const RESOURCE_IDS_VALUE: &[Field] = &[field("exists", SchemaType::Bool)];

pub fn allowance_table() -> Table {
    Table::new("", "AllowanceV2", ALLOWANCE_KEY, ALLOWANCE_VALUE)
}

pub fn allowance_list_table() -> Table {
    Table::new("", "AllowanceList", USER_KEY, ALLOWANCE_LIST_VALUE)
}

pub fn spender_table() -> Table {
    Table::new("", "Spender", SPENDER_KEY, SPENDER_VALUE)
}

pub fn balance_table() -> Table {
    Table::new("", "Balance", USER_KEY, BALANCE_VALUE)
}

pub fn pass_config_table() -> Table {
    Table::new("", "PassConfig", PASS_KEY, PASS_CONFIG_VALUE)
}

pub fn pass_holder_table() -> Table {
    Table::new("", "PassHolder", PASS_HOLDER_KEY, PASS_HOLDER_VALUE)
}

/// Per-deployment table recording which users were already granted.
pub fn grants_table(namespace: &str) -> Table {
    Table::new(namespace, "Grants", USER_KEY, GRANTS_VALUE)
}

pub fn namespace_owner_table() -> Table {
    Table::new("world", "NamespaceOwner", NAMESPACE_OWNER_KEY, NAMESPACE_OWNER_VALUE)
}

pub fn resource_ids_table() -> Table {
    Table::new("store", "ResourceIds", RESOURCE_IDS_KEY, RESOURCE_IDS_VALUE)
}
