// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field and stream encryption: PBKDF2-HMAC-SHA256 key derivation and
// AES-256-GCM sealing via `ring`.
//
// Field ciphertext layout:
//
//   nonce (12) || ciphertext || tag (16)
//
// Stream layout:
//
//   header  = "HIPS" || version (1) || nonce prefix (7) || chunk size (u32 BE)
//   frame*  = sealed length (u32 BE) || sealed chunk
//
// Each chunk nonce is prefix || counter (u32 BE) || last-flag, and the
// header is bound to every chunk as associated data, so reordering,
// truncation, and trailing garbage all fail authentication.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::NonZeroU32;
use std::path::Path;

use hipaa_core::TrainingConfig;
use hipaa_core::config::{MIN_SALT_LEN, MIN_SECRET_LEN};
use hipaa_core::error::{ComplianceError, Result};
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, MAX_TAG_LEN, NONCE_LEN, Nonce, UnboundKey};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Default plaintext bytes per stream chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Largest chunk size accepted when reading a stream header.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Evidence cap used until a configuration supplies one.
pub const DEFAULT_EVIDENCE_LIMIT: u64 = 10 * 1024 * 1024;

const KEY_LEN: usize = 32;
const FIELD_AAD: &[u8] = b"hipaa-field-v2";
const STREAM_MAGIC: &[u8; 4] = b"HIPS";
const STREAM_VERSION: u8 = 1;
const NONCE_PREFIX_LEN: usize = 7;
const HEADER_LEN: usize = STREAM_MAGIC.len() + 1 + NONCE_PREFIX_LEN + 4;

/// Symmetric cipher bound to one derived key.
///
/// The key lives only in memory. Nothing here persists key material, and
/// calls share no mutable state, so one `Cipher` may serve many threads.
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
    chunk_size: usize,
    evidence_limit: u64,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"AES-256-GCM")
            .field("chunk_size", &self.chunk_size)
            .field("evidence_limit", &self.evidence_limit)
            .finish_non_exhaustive()
    }
}

impl Cipher {
    /// Derive a key from `secret` and `salt` with PBKDF2-HMAC-SHA256.
    ///
    /// The same inputs always yield the same key.
    #[instrument(skip(secret, salt))]
    pub fn derive_key(secret: &[u8], salt: &[u8], iterations: u32) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ComplianceError::Config(format!(
                "encryption secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if salt.len() < MIN_SALT_LEN {
            return Err(ComplianceError::Config(format!(
                "salt must be at least {MIN_SALT_LEN} bytes"
            )));
        }
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| ComplianceError::Config("KDF iterations must be positive".into()))?;

        let mut key_bytes = [0u8; KEY_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            secret,
            &mut key_bytes,
        );
        let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
            .map_err(|_| ComplianceError::Config("derived key rejected by AES-256-GCM".into()));
        key_bytes.fill(0);

        debug!("field key derived");
        Ok(Self {
            key: LessSafeKey::new(unbound?),
            rng: SystemRandom::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            evidence_limit: DEFAULT_EVIDENCE_LIMIT,
        })
    }

    /// Derive the key named by the configuration's secret and salt, and
    /// adopt its evidence size cap.
    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        let secret = config.secret();
        let cipher = Self::derive_key(secret.key(), secret.salt(), config.kdf_iterations())?;
        Ok(cipher.with_evidence_limit(config.max_evidence_bytes()))
    }

    /// Override the stream chunk size (clamped to `1..=MAX_CHUNK_SIZE`).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn with_evidence_limit(mut self, max_bytes: u64) -> Self {
        self.evidence_limit = max_bytes;
        self
    }

    /// Largest evidence file [`Cipher::encrypt_file`] accepts.
    pub fn evidence_limit(&self) -> u64 {
        self.evidence_limit
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ComplianceError::Encryption("nonce generation failed".into()))?;

        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(FIELD_AAD),
                &mut sealed,
            )
            .map_err(|_| ComplianceError::Encryption("AES-GCM seal failed".into()))?;

        let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        debug!(ciphertext_len = ciphertext.len(), "encryption complete");
        Ok(ciphertext)
    }

    /// Decrypt a value produced by [`Cipher::encrypt`].
    ///
    /// Structurally short input is a `Format` error; anything that fails
    /// authentication (tampering, wrong key) is an `Integrity` error.
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + MAX_TAG_LEN {
            return Err(ComplianceError::Format(format!(
                "ciphertext is {} bytes, shorter than nonce and tag",
                ciphertext.len()
            )));
        }

        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| ComplianceError::Format("bad nonce length".into()))?;

        let mut buffer = sealed.to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::from(FIELD_AAD), &mut buffer)
            .map_err(|_| ComplianceError::Integrity("ciphertext failed authentication".into()))?
            .len();
        buffer.truncate(plaintext_len);

        debug!(plaintext_len, "decryption complete");
        Ok(buffer)
    }

    /// Encrypt text and armour the result as lowercase hex.
    pub fn encrypt_text(&self, plaintext: &str) -> Result<String> {
        self.encrypt(plaintext.as_bytes()).map(hex::encode)
    }

    /// Inverse of [`Cipher::encrypt_text`].
    pub fn decrypt_text(&self, armoured: &str) -> Result<String> {
        let ciphertext = hex::decode(armoured.trim())
            .map_err(|e| ComplianceError::Format(format!("ciphertext is not hex: {e}")))?;
        let plaintext = self.decrypt(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| ComplianceError::Format(format!("plaintext is not UTF-8: {e}")))
    }

    /// Encrypt everything readable from `source` into `dest`, one chunk at a
    /// time. Returns the number of plaintext bytes consumed.
    ///
    /// Output goes to a temporary file beside `dest` that is renamed into
    /// place only after the final chunk is sealed and synced; on any error
    /// `dest` is left untouched.
    #[instrument(skip(self, source), fields(dest = %dest.display(), chunk_size = self.chunk_size))]
    pub fn encrypt_stream<R: Read>(&self, mut source: R, dest: &Path) -> Result<u64> {
        let mut tmp = NamedTempFile::new_in(parent_dir(dest))?;
        let consumed = {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let consumed = self.seal_frames(&mut source, &mut out)?;
            out.flush()?;
            consumed
        };
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| ComplianceError::Io(e.error))?;

        debug!(consumed, "stream encrypted");
        Ok(consumed)
    }

    /// Decrypt a stream written by [`Cipher::encrypt_stream`] into `dest`,
    /// with the same all-or-nothing guarantee. Returns plaintext bytes written.
    #[instrument(skip(self, source), fields(dest = %dest.display()))]
    pub fn decrypt_stream<R: Read>(&self, mut source: R, dest: &Path) -> Result<u64> {
        let mut tmp = NamedTempFile::new_in(parent_dir(dest))?;
        let produced = {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let produced = self.open_frames(&mut source, &mut out)?;
            out.flush()?;
            produced
        };
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| ComplianceError::Io(e.error))?;

        debug!(produced, "stream decrypted");
        Ok(produced)
    }

    /// Encrypt an evidence file, refusing anything larger than the evidence
    /// limit before reading it.
    pub fn encrypt_file(&self, source: &Path, dest: &Path) -> Result<u64> {
        let max_bytes = self.evidence_limit;
        let file = File::open(source)?;
        let len = file.metadata()?.len();
        if len > max_bytes {
            return Err(ComplianceError::invalid(
                "evidence",
                format!("{len} bytes exceeds the {max_bytes}-byte limit"),
            ));
        }
        self.encrypt_stream(BufReader::new(file).take(max_bytes), dest)
    }

    fn seal_frames<R: Read, W: Write>(&self, source: &mut R, out: &mut W) -> Result<u64> {
        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        self.rng
            .fill(&mut prefix)
            .map_err(|_| ComplianceError::Encryption("nonce generation failed".into()))?;
        let header = stream_header(&prefix, self.chunk_size as u32);
        out.write_all(&header)?;

        let mut current = vec![0u8; self.chunk_size];
        let mut next = vec![0u8; self.chunk_size];
        let mut current_len = read_full(source, &mut current)?;
        let mut counter: u32 = 0;
        let mut consumed: u64 = 0;

        loop {
            // A short read means EOF, so only a full chunk needs a lookahead.
            let next_len = if current_len == self.chunk_size {
                read_full(source, &mut next)?
            } else {
                0
            };
            let last = next_len == 0;

            let mut frame = Vec::with_capacity(current_len + MAX_TAG_LEN);
            frame.extend_from_slice(&current[..current_len]);
            self.key
                .seal_in_place_append_tag(
                    chunk_nonce(&prefix, counter, last),
                    Aad::from(&header),
                    &mut frame,
                )
                .map_err(|_| ComplianceError::Encryption(format!("chunk {counter} seal failed")))?;

            out.write_all(&(frame.len() as u32).to_be_bytes())?;
            out.write_all(&frame)?;
            consumed += current_len as u64;

            if last {
                return Ok(consumed);
            }
            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
            counter = counter
                .checked_add(1)
                .ok_or_else(|| ComplianceError::Encryption("stream exceeds chunk counter".into()))?;
        }
    }

    fn open_frames<R: Read, W: Write>(&self, source: &mut R, out: &mut W) -> Result<u64> {
        let mut header = [0u8; HEADER_LEN];
        if read_full(source, &mut header)? < HEADER_LEN {
            return Err(ComplianceError::Format("stream header truncated".into()));
        }
        if &header[..STREAM_MAGIC.len()] != STREAM_MAGIC {
            return Err(ComplianceError::Format("not an encrypted stream".into()));
        }
        if header[STREAM_MAGIC.len()] != STREAM_VERSION {
            return Err(ComplianceError::Format(format!(
                "unsupported stream version {}",
                header[STREAM_MAGIC.len()]
            )));
        }

        let mut prefix = [0u8; NONCE_PREFIX_LEN];
        prefix.copy_from_slice(&header[5..5 + NONCE_PREFIX_LEN]);
        let mut size_bytes = [0u8; 4];
        size_bytes.copy_from_slice(&header[HEADER_LEN - 4..]);
        let chunk_size = u32::from_be_bytes(size_bytes) as usize;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ComplianceError::Format(format!("invalid chunk size {chunk_size}")));
        }
        let max_frame = chunk_size + MAX_TAG_LEN;

        let mut len_buf = [0u8; 4];
        if read_full(source, &mut len_buf)? < len_buf.len() {
            return Err(ComplianceError::Integrity("stream truncated before first chunk".into()));
        }

        let mut frame = Vec::with_capacity(max_frame);
        let mut counter: u32 = 0;
        let mut produced: u64 = 0;

        loop {
            let frame_len = u32::from_be_bytes(len_buf) as usize;
            if !(MAX_TAG_LEN..=max_frame).contains(&frame_len) {
                return Err(ComplianceError::Format(format!(
                    "chunk {counter} has invalid length {frame_len}"
                )));
            }
            frame.resize(frame_len, 0);
            if read_full(source, &mut frame)? < frame_len {
                return Err(ComplianceError::Integrity(format!("chunk {counter} truncated")));
            }

            // The final chunk is the one with nothing after it; if that
            // disagrees with the sealed flag, authentication fails below.
            let last = match read_full(source, &mut len_buf)? {
                0 => true,
                4 => false,
                _ => return Err(ComplianceError::Integrity("stream truncated mid-frame".into())),
            };

            let plaintext = self
                .key
                .open_in_place(chunk_nonce(&prefix, counter, last), Aad::from(&header), &mut frame)
                .map_err(|_| {
                    ComplianceError::Integrity(format!("chunk {counter} failed authentication"))
                })?;
            out.write_all(plaintext)?;
            produced += plaintext.len() as u64;

            if last {
                return Ok(produced);
            }
            counter = counter
                .checked_add(1)
                .ok_or_else(|| ComplianceError::Format("stream exceeds chunk counter".into()))?;
        }
    }
}

fn stream_header(prefix: &[u8; NONCE_PREFIX_LEN], chunk_size: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(STREAM_MAGIC);
    header[4] = STREAM_VERSION;
    header[5..5 + NONCE_PREFIX_LEN].copy_from_slice(prefix);
    header[HEADER_LEN - 4..].copy_from_slice(&chunk_size.to_be_bytes());
    header
}

fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_LEN], counter: u32, last: bool) -> Nonce {
    let mut bytes = [0u8; NONCE_LEN];
    bytes[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    bytes[NONCE_PREFIX_LEN..NONCE_LEN - 1].copy_from_slice(&counter.to_be_bytes());
    bytes[NONCE_LEN - 1] = u8::from(last);
    Nonce::assume_unique_for_key(bytes)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Fill `buf` as far as the reader allows; returns bytes read (short only at EOF).
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
