//! Purse applet
//!
//! Main dispatcher for purse card commands. APDUs are joined across command
//! chaining, decoded into a [`Command`], checked against the card lifecycle
//! and PIN state, and routed to the key hierarchy, field store, avatar
//! transfer or signing key. Every operation is also available as a typed
//! method for hosts that do not speak APDUs.

use log::{debug, error, info, warn};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroize;

use super::field_store::{FieldStore, MAX_INFO_LEN};
use super::key_hierarchy::KeyHierarchy;
use super::pin_manager::{PINManager, PinState};
use super::security_state::SecurityState;
use super::transfer::{AvatarChunk, AvatarSlice, AvatarTransfer, UploadStatus};
use crate::apdu::{parse_apdu, BalanceOp, Command, DataField, Pin, Response, APDU, SW};
use crate::card::{CardDataStore, CardIdentity, CardState};
use crate::config::EngineConfig;
use crate::crypto::rsa::RSA_KEY_BITS;
use crate::crypto::{MasterKey, RsaOperations};
use crate::error::{CardError, ErrorKind};

/// Purse application identifier ("PURSE" under a proprietary RID)
pub const PURSE_AID: &[u8] = &[0xF0, 0x50, 0x55, 0x52, 0x53, 0x45, 0x01];

/// Most data the chained segments of one command may carry (the info field)
const MAX_CHAINED_LEN: usize = MAX_INFO_LEN;

/// One purse card: persistent state plus the current session
pub struct PurseApplet {
    store: CardDataStore,
    config: EngineConfig,
    pin_manager: PINManager,
    keys: KeyHierarchy,
    security_state: SecurityState,
    transfer: AvatarTransfer,
    response_buffer: Vec<u8>,
    response_offset: usize,
    command_buffer: Vec<u8>,
    chaining_ins: Option<u8>,
    /// Current command's Le (expected response length)
    current_le: Option<u32>,
}

impl PurseApplet {
    /// Create an applet over an already loaded store. Out-of-range
    /// tunables are clamped.
    pub fn new(store: CardDataStore, config: EngineConfig) -> Self {
        let config = config.clamped();
        Self {
            store,
            pin_manager: PINManager::new(config.max_pin_tries),
            keys: KeyHierarchy::new(config.kdf_iterations),
            config,
            security_state: SecurityState::new(),
            transfer: AvatarTransfer::new(),
            response_buffer: Vec::new(),
            response_offset: 0,
            command_buffer: Vec::new(),
            chaining_ins: None,
            current_le: None,
        }
    }

    /// Create an applet over `config.storage_dir`, loading any saved card
    pub fn open(config: EngineConfig) -> Self {
        let mut store = CardDataStore::new(config.storage_dir.as_deref());
        if store.load() {
            debug!("Loaded saved card state");
        }
        Self::new(store, config)
    }

    /// Use `key` as the card keypair instead of generating one at provisioning
    pub fn with_signing_key(mut self, key: &RsaPrivateKey) -> Result<Self, CardError> {
        self.store.get_state_mut().signing_key = RsaOperations::encode_private_key(key)?;
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of the persistent state
    pub fn card_state(&self) -> &CardState {
        self.store.get_state()
    }

    #[cfg(test)]
    pub(crate) fn card_state_mut(&mut self) -> &mut CardState {
        self.store.get_state_mut()
    }

    /// Parse raw command bytes and return raw response bytes (data ∥ SW1 SW2)
    pub fn process_bytes(&mut self, raw: &[u8]) -> Vec<u8> {
        match parse_apdu(raw) {
            Ok(cmd) => self.process_apdu(&cmd).to_bytes(),
            Err(e) => {
                let err = CardError::from(e);
                Self::log_error(&err);
                Response::from(&err).to_bytes()
            }
        }
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        self.current_le = cmd.le;

        if cmd.is_chained() {
            return self.handle_command_chaining(cmd);
        }

        // If we had chained commands, combine them
        let mut effective_cmd = if self.chaining_ins.is_some() {
            if self.chaining_ins != Some(cmd.ins) {
                self.discard_chain();
                let err = CardError::ConditionsNotSatisfied("command chain interrupted");
                Self::log_error(&err);
                return Response::from(&err);
            }

            let mut combined_data = std::mem::take(&mut self.command_buffer);
            combined_data.extend_from_slice(&cmd.data);
            self.chaining_ins = None;

            APDU {
                cla: cmd.base_cla(),
                ins: cmd.ins,
                p1: cmd.p1,
                p2: cmd.p2,
                data: combined_data,
                le: cmd.le,
            }
        } else {
            cmd.clone()
        };

        debug!(
            "Purse APDU: INS={:02X} P1={:02X} P2={:02X} Lc={}",
            effective_cmd.ins,
            effective_cmd.p1,
            effective_cmd.p2,
            effective_cmd.data.len()
        );

        let result = Command::parse(&effective_cmd).and_then(|command| {
            // Any command other than GET RESPONSE drops an unread response
            if command != Command::GetResponse {
                self.clear_response();
            }
            self.execute(command)
        });
        effective_cmd.data.zeroize();

        match result {
            Ok(resp) => resp,
            Err(err) => {
                Self::log_error(&err);
                Response::from(&err)
            }
        }
    }

    /// Card reset or power cycle: the session ends, persistent state stays
    pub fn reset(&mut self) {
        self.security_state.clear();
        self.discard_chain();
        self.clear_response();
        self.transfer.discard();
        self.current_le = None;
        debug!("Purse applet reset");
    }

    fn log_error(err: &CardError) {
        match err.kind() {
            ErrorKind::Internal => error!("Command failed: {}", err),
            ErrorKind::Auth | ErrorKind::FatalSecurity => warn!("Command rejected: {}", err),
            ErrorKind::Protocol | ErrorKind::Business => debug!("Command rejected: {}", err),
        }
    }

    /// Handle command chaining (CLA bit 4 set)
    fn handle_command_chaining(&mut self, cmd: &APDU) -> Response {
        if self.chaining_ins.is_none() {
            self.chaining_ins = Some(cmd.ins);
            self.command_buffer.zeroize();
        } else if self.chaining_ins != Some(cmd.ins) {
            self.discard_chain();
            return Response::from(&CardError::ConditionsNotSatisfied("command chain interrupted"));
        }

        if self.command_buffer.len() + cmd.data.len() > MAX_CHAINED_LEN {
            self.discard_chain();
            let err = CardError::WrongLength("command chain too long");
            Self::log_error(&err);
            return Response::from(&err);
        }

        self.command_buffer.extend_from_slice(&cmd.data);
        Response::ok()
    }

    fn discard_chain(&mut self) {
        self.command_buffer.zeroize();
        self.chaining_ins = None;
    }

    /// Largest response segment for the current command
    fn segment_len(&self) -> usize {
        let limit = self.config.max_response_len;
        self.current_le
            .map_or(limit, |le| (le as usize).min(limit))
            .max(1)
    }

    /// Create response with chaining if needed
    fn create_response(&mut self, data: Vec<u8>) -> Response {
        let max_response = self.segment_len();
        if data.len() <= max_response {
            return Response::success(data);
        }

        self.response_buffer = data;
        self.response_offset = max_response;
        let chunk = self.response_buffer[..max_response].to_vec();
        Response::more_data(chunk, self.response_buffer.len() - max_response)
    }

    /// GET RESPONSE: next segment of a chained response
    fn next_response_segment(&mut self) -> Result<Response, CardError> {
        if self.response_offset >= self.response_buffer.len() {
            return Err(CardError::ConditionsNotSatisfied("no response data pending"));
        }

        let remaining = self.response_buffer.len() - self.response_offset;
        let chunk_size = self.segment_len().min(remaining);
        let start = self.response_offset;
        let data = self.response_buffer[start..start + chunk_size].to_vec();
        self.response_offset += chunk_size;

        let left = self.response_buffer.len() - self.response_offset;
        if left == 0 {
            self.clear_response();
            Ok(Response::success(data))
        } else {
            Ok(Response::more_data(data, left))
        }
    }

    fn clear_response(&mut self) {
        self.response_buffer.zeroize();
        self.response_offset = 0;
    }

    fn execute(&mut self, command: Command) -> Result<Response, CardError> {
        match command {
            Command::Select { aid } => {
                if aid.starts_with(PURSE_AID) {
                    Ok(Response::ok())
                } else {
                    Ok(Response::error(SW::FILE_NOT_FOUND))
                }
            }
            Command::Provision { pin, identity } => {
                let id_bytes = identity.as_bytes().to_vec();
                let public_key = self.provision(&pin, identity)?;
                let mut data = Vec::with_capacity(1 + id_bytes.len() + public_key.len());
                data.push(id_bytes.len() as u8);
                data.extend_from_slice(&id_bytes);
                data.extend_from_slice(&public_key);
                Ok(self.create_response(data))
            }
            Command::VerifyPin { pin } => {
                let tries = self.verify_pin(&pin)?;
                Ok(Response::success(vec![0x01, tries]))
            }
            Command::ChangePin { old_pin, new_pin } => {
                self.change_pin(&old_pin, &new_pin)?;
                Ok(Response::ok())
            }
            Command::ResetTries => Ok(Response::success(vec![self.reset_tries()?])),
            Command::ForgetPin { new_pin } => Ok(Response::success(vec![self.forget_pin(&new_pin)?])),
            Command::Activate => Ok(Response::success(vec![self.activate()?])),
            Command::Deactivate => {
                self.deactivate()?;
                Ok(Response::ok())
            }
            Command::Clear => {
                self.clear();
                Ok(Response::ok())
            }
            Command::UpdateBalance { op, amount } => {
                let balance = self.update_balance(op, amount)?;
                Ok(Response::success(balance.to_be_bytes().to_vec()))
            }
            Command::PutInfo { mut info } => {
                let result = self.set_info(&info);
                info.zeroize();
                result?;
                Ok(Response::ok())
            }
            Command::UploadAvatar(chunk) => match self.upload_avatar_chunk(&chunk)? {
                UploadStatus::Pending => Ok(Response::ok()),
                UploadStatus::Committed { ciphertext_len } => {
                    Ok(Response::success(ciphertext_len.to_be_bytes().to_vec()))
                }
            },
            Command::GetData(field) => self.handle_get_data(field),
            Command::GetAvatarChunk { offset } => {
                Ok(Response::success(self.avatar_chunk(offset)?.to_bytes()))
            }
            Command::Sign { challenge } => {
                let signature = self.sign(&challenge)?;
                Ok(self.create_response(signature))
            }
            Command::GetResponse => self.next_response_segment(),
        }
    }

    fn handle_get_data(&mut self, field: DataField) -> Result<Response, CardError> {
        let data = match field {
            DataField::Balance => self.balance()?.to_be_bytes().to_vec(),
            DataField::Info => self.info()?,
            DataField::Avatar => self.avatar()?,
            // Decoded as GetAvatarChunk when the offset is present
            DataField::AvatarChunk => return Err(CardError::WrongLength("offset is 2 bytes")),
            DataField::Identity => self.identity()?.as_bytes().to_vec(),
            DataField::PublicKey => self.public_key()?,
            DataField::TriesRemaining => vec![self.tries_remaining()?],
        };
        Ok(self.create_response(data))
    }

    // =========================================================================
    // Preconditions
    // =========================================================================

    fn require_initialized(&self) -> Result<(), CardError> {
        if self.card_state().flags.initialized {
            Ok(())
        } else {
            Err(CardError::NotInitialized)
        }
    }

    fn require_verified(&self) -> Result<(), CardError> {
        self.require_initialized()?;
        if self.security_state.is_verified() {
            Ok(())
        } else {
            Err(CardError::NotVerified)
        }
    }

    /// Unwrap the master key for one operation. It is wiped when the
    /// returned value drops, on every exit path of the caller.
    fn unlock_master_key(&self) -> Result<MasterKey, CardError> {
        self.require_initialized()?;
        let pin_key = self.security_state.pin_key().ok_or(CardError::NotVerified)?;
        self.keys.unwrap_master(self.card_state(), pin_key)
    }

    fn signing_key(&self) -> Result<RsaPrivateKey, CardError> {
        let card = self.card_state();
        if !card.has_signing_key() {
            return Err(CardError::ConditionsNotSatisfied("no signing key"));
        }
        RsaOperations::decode_private_key(&card.signing_key)
    }

    /// Save the state; a failed write is logged and the RAM state kept
    fn persist(&self) {
        if let Err(e) = self.store.save() {
            error!("Failed to persist card state: {}", e);
        }
    }

    // =========================================================================
    // Lifecycle and PIN
    // =========================================================================

    /// Provision a blank card and return its public key blob
    pub fn provision(&mut self, pin: &Pin, identity: CardIdentity) -> Result<Vec<u8>, CardError> {
        if self.card_state().flags.initialized {
            return Err(CardError::AlreadyInitialized);
        }
        if !self.card_state().has_signing_key() {
            debug!("Generating RSA-{} card keypair", RSA_KEY_BITS);
            let key = RsaOperations::generate_keypair(RSA_KEY_BITS)?;
            self.store.get_state_mut().signing_key = RsaOperations::encode_private_key(&key)?;
        }

        let max_tries = self.pin_manager.max_tries();
        let card = self.store.get_state_mut();
        self.keys.provision(card, pin, identity)?;
        card.pin_tries = max_tries;
        card.flags.initialized = true;
        card.flags.active = true;

        self.security_state.clear();
        self.transfer.discard();
        self.persist();
        info!("Card provisioned");
        self.public_key()
    }

    /// Verify the cardholder PIN; returns the tries remaining (the maximum)
    pub fn verify_pin(&mut self, pin: &Pin) -> Result<u8, CardError> {
        self.pin_manager.check_can_verify(self.card_state())?;

        let card = self.store.get_state_mut();
        match self.keys.verify(card, pin)? {
            Some(pin_key) => {
                self.pin_manager.record_success(card);
                let tries = card.pin_tries;
                self.security_state.set_verified(pin_key);
                self.persist();
                debug!("PIN verified");
                Ok(tries)
            }
            None => {
                let err = self.pin_manager.record_failure(card);
                self.security_state.clear();
                self.persist();
                Err(err)
            }
        }
    }

    /// Rotate the PIN. Stored fields are not re-encrypted.
    pub fn change_pin(&mut self, old_pin: &Pin, new_pin: &Pin) -> Result<(), CardError> {
        self.require_verified()?;

        let card = self.store.get_state_mut();
        match self.keys.change_pin(card, old_pin, new_pin)? {
            Some(new_key) => {
                self.pin_manager.record_success(card);
                self.security_state.set_verified(new_key);
                self.persist();
                info!("PIN changed");
                Ok(())
            }
            None => {
                let err = self.pin_manager.record_failure(card);
                if card.pin_tries == 0 {
                    self.security_state.clear();
                }
                self.persist();
                Err(err)
            }
        }
    }

    /// Admin: restore the try counter and reactivate the card
    pub fn activate(&mut self) -> Result<u8, CardError> {
        self.require_initialized()?;
        self.pin_manager.restore(self.store.get_state_mut());
        self.persist();
        Ok(self.card_state().pin_tries)
    }

    /// Admin: same effect and policy as [`Self::activate`]
    pub fn reset_tries(&mut self) -> Result<u8, CardError> {
        self.activate()
    }

    /// Admin: lock the card and end the session
    pub fn deactivate(&mut self) -> Result<(), CardError> {
        self.require_initialized()?;
        self.security_state.clear();
        self.pin_manager.lock(self.store.get_state_mut());
        self.persist();
        Ok(())
    }

    /// Admin: replace a forgotten PIN, keeping every stored field readable.
    /// Restores the try counter; the active flag is left as it was.
    pub fn forget_pin(&mut self, new_pin: &Pin) -> Result<u8, CardError> {
        self.require_initialized()?;

        let card = self.store.get_state_mut();
        self.keys.forget_pin(card, new_pin)?;
        self.pin_manager.record_success(card);

        self.security_state.clear();
        self.persist();
        info!("PIN replaced by admin");
        Ok(self.card_state().pin_tries)
    }

    /// Wipe the card back to blank. The RSA keypair is kept.
    pub fn clear(&mut self) {
        self.store.get_state_mut().clear();
        self.security_state.clear();
        self.transfer.discard();
        self.discard_chain();
        self.clear_response();
        self.persist();
        info!("Card cleared");
    }

    // =========================================================================
    // Fields
    // =========================================================================

    pub fn update_balance(&mut self, op: BalanceOp, amount: i32) -> Result<i32, CardError> {
        let master_key = self.unlock_master_key()?;
        let balance = FieldStore::apply_delta(self.store.get_state_mut(), &master_key, op, amount)?;
        self.persist();
        Ok(balance)
    }

    pub fn balance(&self) -> Result<i32, CardError> {
        let master_key = self.unlock_master_key()?;
        FieldStore::balance(self.card_state(), &master_key)
    }

    pub fn set_info(&mut self, info: &[u8]) -> Result<(), CardError> {
        let master_key = self.unlock_master_key()?;
        FieldStore::store_info(self.store.get_state_mut(), &master_key, info)?;
        self.persist();
        Ok(())
    }

    pub fn info(&self) -> Result<Vec<u8>, CardError> {
        let master_key = self.unlock_master_key()?;
        FieldStore::load_info(self.card_state(), &master_key)
    }

    /// Accept one upload chunk; the final one commits the avatar
    pub fn upload_avatar_chunk(&mut self, chunk: &AvatarChunk) -> Result<UploadStatus, CardError> {
        self.require_verified()?;
        self.transfer.accept(chunk)?;
        if !chunk.is_final {
            return Ok(UploadStatus::Pending);
        }

        let master_key = self.unlock_master_key()?;
        let ciphertext = self.transfer.seal(&master_key, chunk.total_len)?;
        let ciphertext_len = ciphertext.len() as u16;
        self.store.get_state_mut().encrypted_avatar = ciphertext;
        self.persist();
        info!("Avatar committed ({} bytes)", chunk.total_len);
        Ok(UploadStatus::Committed { ciphertext_len })
    }

    /// Whole avatar with trailing zeros stripped
    pub fn avatar(&self) -> Result<Vec<u8>, CardError> {
        let master_key = self.unlock_master_key()?;
        AvatarTransfer::read_whole(self.card_state(), &master_key)
    }

    pub fn avatar_chunk(&self, offset: u16) -> Result<AvatarSlice, CardError> {
        let master_key = self.unlock_master_key()?;
        AvatarTransfer::read_chunk(self.card_state(), &master_key, offset)
    }

    // =========================================================================
    // Identity and signing
    // =========================================================================

    pub fn identity(&self) -> Result<&CardIdentity, CardError> {
        self.card_state()
            .identity
            .as_ref()
            .ok_or(CardError::NotInitialized)
    }

    /// `expLen(2) ∥ e ∥ modLen(2) ∥ n`
    pub fn public_key(&self) -> Result<Vec<u8>, CardError> {
        self.require_initialized()?;
        let key = self.signing_key()?;
        Ok(RsaOperations::export_public_key(&RsaPublicKey::from(&key)))
    }

    /// PKCS#1 v1.5 / SHA-1 signature over `challenge`
    pub fn sign(&self, challenge: &[u8]) -> Result<Vec<u8>, CardError> {
        self.require_verified()?;
        let key = self.signing_key()?;
        RsaOperations::sign_challenge(&key, challenge)
    }

    pub fn tries_remaining(&self) -> Result<u8, CardError> {
        self.require_initialized()?;
        Ok(self.card_state().pin_tries)
    }

    pub fn pin_state(&self) -> PinState {
        self.pin_manager
            .state(self.card_state(), self.security_state.is_verified())
    }

    pub fn is_verified(&self) -> bool {
        self.security_state.is_verified()
    }
}
