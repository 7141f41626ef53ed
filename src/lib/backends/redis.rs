//! Redis store backend.
//!
//! Each [`Batch`] runs as one Lua script, a single atomic step on the server.
//! The script checks the whole batch before its first write, so a batch that
//! would fail part way (tripped guard, missing required key, wrong key type,
//! non-numeric or non-finite result) is rejected with nothing applied.
//! `MULTI`/`EXEC` is not used because it keeps applying the remaining
//! commands after a failing one, and cannot abort on a guard.
//!
//! Keys are passed as script arguments, so this targets a single
//! (non-cluster) Redis instance. Scripting requires Redis 2.6 or newer.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client, RedisError, Script};
use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;

use crate::{
    error::{StoreError, StoreResult},
    store::{StoreClient, StoreHealth},
    types::{Batch, Command},
    version::parse_info_version,
};

// The first pass simulates the whole batch (guard, key types, numeric
// results, required renames) without writing. Only when it passes does the
// second pass write, so a rejected batch leaves the keyspace untouched.
// The guard marker is written last.
const BATCH_SCRIPT: &str = r#"
local argc = #ARGV
local MAX_INT = 9223372036854775807

-- origin: physical key holding a logical key's pre-batch data, false if none
-- kinds: simulated type per key, pending: simulated hash fields per key
local origin = {}
local kinds = {}
local pending = {}

local function source(key)
  local src = origin[key]
  if src == nil then return key end
  return src
end

local function kind(key)
  if kinds[key] ~= nil then return kinds[key] end
  local src = source(key)
  if src == false then return 'none' end
  return redis.call('TYPE', src)['ok']
end

local function claim(key, wanted)
  local found = kind(key)
  if found ~= 'none' and found ~= wanted then
    return 'BADTYPE ' .. key .. ' holds a ' .. found .. ', expected ' .. wanted
  end
  kinds[key] = wanted
end

local function field_value(key, field)
  local staged = pending[key]
  if staged ~= nil and staged[field] ~= nil then return staged[field] end
  local src = source(key)
  if src == false then return false end
  return redis.call('HGET', src, field)
end

local function stage_field(key, field, value)
  if pending[key] == nil then pending[key] = {} end
  pending[key][field] = value
end

local function integer_value(raw)
  if raw == false then return 0 end
  if type(raw) == 'number' then
    if raw == math.floor(raw) then return raw end
    return nil
  end
  if raw == '0' or string.match(raw, '^-?[1-9]%d*$') then return tonumber(raw) end
  return nil
end

if ARGV[1] == '1' and redis.call('HEXISTS', ARGV[2], ARGV[3]) == 1 then
  return redis.error_reply('GUARDSET ' .. ARGV[2] .. ' ' .. ARGV[3])
end

local i = 5
while i <= argc do
  local op, key = ARGV[i], ARGV[i + 1]
  local err
  if op == 'HINCRBYFLOAT' then
    local field = ARGV[i + 2]
    err = claim(key, 'hash')
    if not err then
      local raw = field_value(key, field)
      local current = 0
      if raw ~= false then current = tonumber(raw) end
      local delta = tonumber(ARGV[i + 3])
      if current == nil or delta == nil then
        err = 'NOTNUMBER ' .. key .. ' ' .. field
      else
        local next = current + delta
        if next ~= next or next == math.huge or next == -math.huge then
          err = 'NOTFINITE ' .. key .. ' ' .. field
        else
          stage_field(key, field, next)
        end
      end
    end
    i = i + 4
  elseif op == 'HINCRBY' then
    local field = ARGV[i + 2]
    err = claim(key, 'hash')
    if not err then
      local current = integer_value(field_value(key, field))
      local delta = tonumber(ARGV[i + 3])
      if current == nil or delta == nil then
        err = 'NOTINTEGER ' .. key .. ' ' .. field
      else
        local next = current + delta
        if math.abs(next) >= MAX_INT then
          err = 'OVERFLOW ' .. key .. ' ' .. field
        else
          stage_field(key, field, next)
        end
      end
    end
    i = i + 4
  elseif op == 'ZADD' then
    err = claim(key, 'zset')
    i = i + 4
  elseif op == 'SADD' then
    err = claim(key, 'set')
    i = i + 3
  elseif op == 'RENAME' then
    local to = ARGV[i + 2]
    local found = kind(key)
    if found == 'none' then
      if ARGV[i + 3] == '1' then err = 'NOSUCHKEY ' .. key end
    elseif key ~= to then
      origin[to] = source(key)
      kinds[to] = found
      pending[to] = pending[key]
      origin[key] = false
      kinds[key] = 'none'
      pending[key] = nil
    end
    i = i + 4
  else
    err = 'BADOP ' .. tostring(op)
  end
  if err then return redis.error_reply(err) end
end

if ARGV[1] == '1' then
  local err = claim(ARGV[2], 'hash')
  if err then return redis.error_reply(err) end
end

i = 5
while i <= argc do
  local op = ARGV[i]
  if op == 'SADD' then
    redis.call('SADD', ARGV[i + 1], ARGV[i + 2])
    i = i + 3
  elseif op == 'RENAME' then
    if ARGV[i + 1] ~= ARGV[i + 2] and redis.call('EXISTS', ARGV[i + 1]) == 1 then
      redis.call('RENAME', ARGV[i + 1], ARGV[i + 2])
    end
    i = i + 4
  else
    redis.call(op, ARGV[i + 1], ARGV[i + 2], ARGV[i + 3])
    i = i + 4
  end
end

if ARGV[1] == '1' then
  redis.call('HSET', ARGV[2], ARGV[3], ARGV[4])
end
return 'OK'
"#;

/// Redis implementation of [`StoreClient`].
pub struct RedisStore {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    script: Script,
    address: String,
    last_operation_timestamp: RwLock<Option<u64>>,
}

impl RedisStore {
    /// Create a new RedisStore; no connection is made until [`RedisStore::connect`].
    pub fn new(host: &str, port: u16) -> StoreResult<Self> {
        let address = format!("redis://{}:{}/", host, port);
        let client = Client::open(address.as_str()).map_err(backend_error)?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            script: Script::new(BATCH_SCRIPT),
            address,
            last_operation_timestamp: RwLock::new(None),
        })
    }

    /// Open the shared multiplexed connection.
    pub async fn connect(&self) -> StoreResult<()> {
        let connection = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                tracing::error!("Redis connection to {} failed: {}", self.address, e);
                backend_error(e)
            })?;
        tracing::debug!("Share processing setup with redis ({})", self.address);
        *self.connection.write().await = Some(connection);
        Ok(())
    }

    async fn get_connection(&self) -> StoreResult<MultiplexedConnection> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(StoreError::BackendUnavailable)
    }

    async fn update_last_operation_timestamp(&self) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        *self.last_operation_timestamp.write().await = Some(timestamp);
    }
}

fn backend_error(e: RedisError) -> StoreError {
    StoreError::BackendError(e.to_string())
}

/// Map script error replies back onto typed store errors.
fn script_error(e: RedisError) -> StoreError {
    let detail = e.detail().unwrap_or_default().to_string();
    match e.code() {
        Some("GUARDSET") => {
            let mut parts = detail.splitn(2, ' ');
            StoreError::GuardTripped {
                key: parts.next().unwrap_or_default().to_string(),
                field: parts.next().unwrap_or_default().to_string(),
            }
        }
        Some("NOSUCHKEY") => StoreError::NoSuchKey(detail),
        Some(code @ ("BADTYPE" | "NOTNUMBER" | "NOTINTEGER" | "NOTFINITE" | "OVERFLOW")) => {
            StoreError::InvalidData(format!("{} {}", code, detail))
        }
        _ => backend_error(e),
    }
}

/// Flatten a batch into the script's argument layout: four guard slots
/// followed by `op, args...` per command.
fn script_args(batch: Batch) -> Vec<String> {
    let (commands, guard) = batch.into_parts();
    let mut args = match guard {
        Some(guard) => vec!["1".to_string(), guard.key, guard.field, guard.value],
        None => vec!["0".to_string(), String::new(), String::new(), String::new()],
    };
    for command in commands {
        match command {
            Command::HashIncrByFloat { key, field, delta } => {
                args.extend(["HINCRBYFLOAT".to_string(), key, field, delta.to_string()])
            }
            Command::HashIncrBy { key, field, delta } => {
                args.extend(["HINCRBY".to_string(), key, field, delta.to_string()])
            }
            Command::SortedSetAdd { key, score, member } => {
                args.extend(["ZADD".to_string(), key, score.to_string(), member])
            }
            Command::SetAdd { key, member } => args.extend(["SADD".to_string(), key, member]),
            Command::Rename { from, to, required } => args.extend([
                "RENAME".to_string(),
                from,
                to,
                if required { "1" } else { "0" }.to_string(),
            ]),
        }
    }
    args
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut connection = self.get_connection().await?;
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut connection = self.get_connection().await?;
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)
    }

    async fn execute(&self, batch: Batch) -> StoreResult<()> {
        let mut connection = self.get_connection().await?;
        self.update_last_operation_timestamp().await;

        let mut invocation = self.script.prepare_invoke();
        for arg in script_args(batch) {
            invocation.arg(arg);
        }
        invocation
            .invoke_async::<_, ()>(&mut connection)
            .await
            .map_err(script_error)
    }

    async fn server_version(&self) -> StoreResult<Option<String>> {
        let mut connection = self.get_connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;
        Ok(parse_info_version(&info))
    }

    async fn health_check(&self) -> StoreResult<StoreHealth> {
        let last_operation = *self.last_operation_timestamp.read().await;
        let ping: Result<String, StoreError> = match self.get_connection().await {
            Ok(mut connection) => redis::cmd("PING")
                .query_async(&mut connection)
                .await
                .map_err(backend_error),
            Err(e) => Err(e),
        };

        Ok(match ping {
            Ok(_) => StoreHealth {
                is_healthy: true,
                backend_type: "redis".to_string(),
                connection_status: "connected".to_string(),
                last_operation_timestamp: last_operation,
                error_message: None,
            },
            Err(e) => StoreHealth {
                is_healthy: false,
                backend_type: "redis".to_string(),
                connection_status: "disconnected".to_string(),
                last_operation_timestamp: last_operation,
                error_message: Some(e.to_string()),
            },
        })
    }
}
