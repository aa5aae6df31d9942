//! SQLite-backed development ledger.
//!
//! Stands in for a remote node so the sidecar can run without one. Accounts,
//! published nullifiers, deployed contracts, entries and shares are plain
//! tables; every mutation returns a receipt with a random transaction hash.

use super::{
    AccountCredentials, Address, ContractDeployment, EntryInput, EntryPage,
    Ledger, LedgerError, NewAccount, NodeInfo, PasswordEntry, TxReceipt, TxStatus, PAGE_SIZE,
};
use crate::compressed::CompressedString;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Chain id reported by [`LocalLedger::connect`]
pub const LOCAL_CHAIN_ID: u64 = 31337;

fn storage(e: rusqlite::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn hex_field(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn random_field() -> String {
    let mut bytes: [u8; 32] = rand::random();
    // Keep below the field modulus
    bytes[0] = 0;
    hex_field(&bytes)
}

fn random_tx_hash() -> String {
    hex_field(&rand::random::<[u8; 32]>())
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn success(tx_hash: String) -> TxReceipt {
    TxReceipt {
        tx_hash,
        status: TxStatus::Success,
    }
}

/// SQLite integers are signed; reject values that would wrap
fn sql_int(value: u64, what: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::InvalidInput(format!("{} {} is out of range", what, value)))
}

fn is_hex_field(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.len() <= 64 && hex::decode(digits).is_ok())
}

/// Address of the account defined by `credentials`
pub fn derive_address(credentials: &AccountCredentials) -> Address {
    hex_field(&digest(&[
        b"account",
        credentials.secret_key.as_bytes(),
        credentials.salt.as_bytes(),
    ]))
}

fn derive_signing_key(secret_key: &str) -> String {
    hex::encode(digest(&[b"signing", secret_key.as_bytes()]))
}

fn init_nullifier(address: &str) -> String {
    hex_field(&digest(&[b"init", address.as_bytes(), address.as_bytes()]))
}

pub struct LocalLedger {
    conn: Mutex<Connection>,
}

impl LocalLedger {
    /// Open a ledger database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    /// Create a new in-memory ledger
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(storage)?;
        let ledger = Self {
            conn: Mutex::new(conn),
        };
        ledger.initialize_schema()?;
        Ok(ledger)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Storage("ledger connection lock poisoned".to_string()))
    }

    fn initialize_schema(&self) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                secret_key TEXT NOT NULL,
                signing_key TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS nullifiers (
                nullifier TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS contracts (
                address TEXT PRIMARY KEY,
                deployer TEXT NOT NULL REFERENCES accounts(address),
                tx_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS entries (
                contract TEXT NOT NULL REFERENCES contracts(address),
                owner TEXT NOT NULL,
                entry_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                password TEXT NOT NULL,
                randomness INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (contract, owner, entry_id)
            );
            CREATE TABLE IF NOT EXISTS shares (
                contract TEXT NOT NULL,
                owner TEXT NOT NULL,
                entry_id INTEGER NOT NULL,
                recipient TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (contract, owner, entry_id, recipient),
                FOREIGN KEY (contract, owner, entry_id)
                    REFERENCES entries(contract, owner, entry_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_shares_recipient ON shares(contract, recipient);",
        )
        .map_err(storage)?;
        Ok(())
    }

    fn insert_account(&self, credentials: &AccountCredentials) -> Result<Address, LedgerError> {
        if !is_hex_field(&credentials.secret_key) || !is_hex_field(&credentials.salt) {
            return Err(LedgerError::InvalidInput(
                "secretKey and salt must be 0x-prefixed hex".to_string(),
            ));
        }
        if hex::decode(&credentials.signing_key).is_err() {
            return Err(LedgerError::InvalidInput(
                "signingKey must be hex".to_string(),
            ));
        }

        let address = derive_address(credentials);
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO accounts (address, secret_key, signing_key, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                address,
                credentials.secret_key,
                credentials.signing_key,
                credentials.salt,
                Utc::now().timestamp()
            ],
        )
        .map_err(storage)?;
        Ok(address)
    }

    fn require_account(conn: &Connection, address: &str) -> Result<(), LedgerError> {
        let known: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE address = ?1",
                [address],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        known
            .map(|_| ())
            .ok_or_else(|| LedgerError::UnknownAccount(address.to_string()))
    }

    fn require_contract(conn: &Connection, contract: &str) -> Result<(), LedgerError> {
        let known: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM contracts WHERE address = ?1",
                [contract],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        known
            .map(|_| ())
            .ok_or_else(|| LedgerError::UnknownContract(contract.to_string()))
    }

    fn entry_exists(
        conn: &Connection,
        contract: &str,
        owner: &str,
        id: u64,
    ) -> Result<bool, LedgerError> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM entries WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3",
                params![contract, owner, sql_int(id, "Entry id")?],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(found.is_some())
    }

    fn page(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<EntryPage, LedgerError> {
        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let mut ids = stmt
            .query_map(params, |row| row.get::<_, i64>(0))
            .map_err(storage)?
            .map(|id| id.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

        let has_more = ids.len() > PAGE_SIZE;
        ids.truncate(PAGE_SIZE);
        Ok(EntryPage { ids, has_more })
    }

    fn owned_page(
        conn: &Connection,
        contract: &str,
        owner: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError> {
        Self::page(
            conn,
            "SELECT entry_id FROM entries WHERE contract = ?1 AND owner = ?2
             ORDER BY entry_id LIMIT ?3 OFFSET ?4",
            &[
                &contract,
                &owner,
                &((PAGE_SIZE + 1) as i64),
                &sql_int(offset, "Offset")?,
            ],
        )
    }

    fn load_entry(
        conn: &Connection,
        contract: &str,
        owner: &str,
        id: u64,
    ) -> Result<Option<PasswordEntry>, LedgerError> {
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT label, password, randomness FROM entries
                 WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3",
                params![contract, owner, sql_int(id, "Entry id")?],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(storage)?;

        let Some((label, password, randomness)) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT recipient FROM shares
                 WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3 ORDER BY recipient",
            )
            .map_err(storage)?;
        let shared_with = stmt
            .query_map(
                params![contract, owner, sql_int(id, "Entry id")?],
                |row| row.get(0),
            )
            .map_err(storage)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(storage)?;

        let decode = |value: &str| {
            CompressedString::from_field_hex(value)
                .map_err(|e| LedgerError::Storage(format!("Corrupt entry {}: {}", id, e)))
        };

        Ok(Some(PasswordEntry {
            id,
            owner: owner.to_string(),
            label: decode(&label)?,
            password: decode(&password)?,
            randomness: randomness as u64,
            shared_with,
        }))
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn connect(&self, node_url: &str) -> Result<NodeInfo, LedgerError> {
        let url = node_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LedgerError::InvalidInput(format!(
                "Only http/https node URLs are supported: {}",
                node_url
            )));
        }
        info!("Local ledger serving node {}", url);
        Ok(NodeInfo {
            node_url: url.to_string(),
            node_version: format!("onekey-local/{}", env!("CARGO_PKG_VERSION")),
            chain_id: LOCAL_CHAIN_ID,
        })
    }

    async fn create_account(&self) -> Result<NewAccount, LedgerError> {
        let secret_key = random_field();
        let credentials = AccountCredentials {
            signing_key: derive_signing_key(&secret_key),
            secret_key,
            salt: random_field(),
        };
        let address = self.insert_account(&credentials)?;
        debug!("Created account {}", address);
        Ok(NewAccount {
            address,
            credentials,
        })
    }

    async fn register_account(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Address, LedgerError> {
        self.insert_account(credentials)
    }

    async fn is_account_deployed(&self, address: &str) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM nullifiers WHERE nullifier = ?1",
                [init_nullifier(address)],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?;
        Ok(found.is_some())
    }

    async fn deploy_account(&self, address: &str) -> Result<TxReceipt, LedgerError> {
        let conn = self.conn()?;
        Self::require_account(&conn, address)?;

        let nullifier = init_nullifier(address);
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO nullifiers (nullifier, created_at) VALUES (?1, ?2)",
                params![nullifier, Utc::now().timestamp()],
            )
            .map_err(storage)?;
        if inserted == 0 {
            return Err(LedgerError::AlreadyDeployed);
        }

        info!("Deployed account {}", address);
        Ok(success(random_tx_hash()))
    }

    async fn deploy_password_manager(
        &self,
        deployer: &str,
    ) -> Result<ContractDeployment, LedgerError> {
        let conn = self.conn()?;
        Self::require_account(&conn, deployer)?;

        let nonce: [u8; 16] = rand::random();
        let address = hex_field(&digest(&[b"contract", deployer.as_bytes(), &nonce]));
        let tx_hash = random_tx_hash();
        conn.execute(
            "INSERT INTO contracts (address, deployer, tx_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![address, deployer, tx_hash, Utc::now().timestamp()],
        )
        .map_err(storage)?;

        info!("Deployed password manager at {}", address);
        Ok(ContractDeployment { address, tx_hash })
    }

    async fn create_entry(
        &self,
        contract: &str,
        owner: &str,
        entry: &EntryInput,
    ) -> Result<TxReceipt, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        if Self::entry_exists(&conn, contract, owner, entry.id)? {
            return Err(LedgerError::DuplicateEntry(entry.id));
        }

        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO entries (contract, owner, entry_id, label, password, randomness, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                contract,
                owner,
                sql_int(entry.id, "Entry id")?,
                entry.label.to_field_hex(),
                entry.password.to_field_hex(),
                sql_int(entry.randomness, "Randomness")?,
                now
            ],
        )
        .map_err(storage)?;

        debug!("Created entry {} in {}", entry.id, contract);
        Ok(success(random_tx_hash()))
    }

    async fn update_entry(
        &self,
        contract: &str,
        owner: &str,
        entry: &EntryInput,
    ) -> Result<TxReceipt, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;

        let updated = conn
            .execute(
                "UPDATE entries SET label = ?4, password = ?5, randomness = ?6, updated_at = ?7
                 WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3",
                params![
                    contract,
                    owner,
                    sql_int(entry.id, "Entry id")?,
                    entry.label.to_field_hex(),
                    entry.password.to_field_hex(),
                    sql_int(entry.randomness, "Randomness")?,
                    Utc::now().timestamp()
                ],
            )
            .map_err(storage)?;
        if updated == 0 {
            return Err(LedgerError::EntryNotFound(entry.id));
        }
        Ok(success(random_tx_hash()))
    }

    async fn delete_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;

        let deleted = conn
            .execute(
                "DELETE FROM entries WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3",
                params![contract, owner, sql_int(id, "Entry id")?],
            )
            .map_err(storage)?;
        if deleted == 0 {
            return Err(LedgerError::EntryNotFound(id));
        }
        Ok(success(random_tx_hash()))
    }

    async fn entry_ids(
        &self,
        contract: &str,
        owner: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        Self::owned_page(&conn, contract, owner, offset)
    }

    async fn entry_by_id(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        offset: u64,
    ) -> Result<Option<PasswordEntry>, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;

        let page = Self::owned_page(&conn, contract, owner, offset)?;
        if !page.ids.contains(&id) {
            return Ok(None);
        }
        Self::load_entry(&conn, contract, owner, id)
    }

    async fn share_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt, LedgerError> {
        if owner == recipient {
            return Err(LedgerError::InvalidInput(
                "Cannot share an entry with its owner".to_string(),
            ));
        }

        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        if !Self::entry_exists(&conn, contract, owner, id)? {
            return Err(LedgerError::EntryNotFound(id));
        }

        conn.execute(
            "INSERT OR IGNORE INTO shares (contract, owner, entry_id, recipient, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                contract,
                owner,
                sql_int(id, "Entry id")?,
                recipient,
                Utc::now().timestamp()
            ],
        )
        .map_err(storage)?;
        Ok(success(random_tx_hash()))
    }

    async fn unshare_entry(
        &self,
        contract: &str,
        owner: &str,
        id: u64,
        recipient: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        if !Self::entry_exists(&conn, contract, owner, id)? {
            return Err(LedgerError::EntryNotFound(id));
        }

        let removed = conn
            .execute(
                "DELETE FROM shares
                 WHERE contract = ?1 AND owner = ?2 AND entry_id = ?3 AND recipient = ?4",
                params![contract, owner, sql_int(id, "Entry id")?, recipient],
            )
            .map_err(storage)?;
        if removed == 0 {
            return Err(LedgerError::InvalidInput(format!(
                "Password entry {} is not shared with {}",
                id, recipient
            )));
        }
        Ok(success(random_tx_hash()))
    }

    async fn shared_entry_ids(
        &self,
        contract: &str,
        recipient: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        Self::page(
            &conn,
            "SELECT entry_id FROM shares WHERE contract = ?1 AND recipient = ?2
             ORDER BY owner, entry_id LIMIT ?3 OFFSET ?4",
            &[
                &contract,
                &recipient,
                &((PAGE_SIZE + 1) as i64),
                &sql_int(offset, "Offset")?,
            ],
        )
    }

    async fn shared_entry_ids_by_owner(
        &self,
        contract: &str,
        recipient: &str,
        owner: &str,
        offset: u64,
    ) -> Result<EntryPage, LedgerError> {
        let conn = self.conn()?;
        Self::require_contract(&conn, contract)?;
        Self::page(
            &conn,
            "SELECT entry_id FROM shares WHERE contract = ?1 AND recipient = ?2 AND owner = ?3
             ORDER BY entry_id LIMIT ?4 OFFSET ?5",
            &[
                &contract,
                &recipient,
                &owner,
                &((PAGE_SIZE + 1) as i64),
                &sql_int(offset, "Offset")?,
            ],
        )
    }
}
