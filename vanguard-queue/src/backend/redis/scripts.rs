//! Lua scripts, one per backend operation. Each runs atomically on the
//! server, which is what makes a transition and its membership move a
//! single unit.
//!
//! Job hash keys are built inside the scripts from the prefix in ARGV, so
//! these scripts assume a single (non-cluster) redis.

use redis::Script;

/// KEYS: job hash, target key
/// ARGV: target kind, score, id, field/value pairs...
pub(crate) fn insert() -> Script {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 4))
if ARGV[1] == 'list' then
  redis.call('RPUSH', KEYS[2], ARGV[3])
else
  redis.call('ZADD', KEYS[2], ARGV[2], ARGV[3])
end
return 1
"#,
    )
}

/// KEYS: n ready lists, then the n matching in-flight sets
/// ARGV: prefix, now ms, default lease ms, n, max lease ms
pub(crate) fn claim() -> Script {
    Script::new(
        r#"
local n = tonumber(ARGV[4])
local now = tonumber(ARGV[2])
for i = 1, n do
  while true do
    local id = redis.call('LPOP', KEYS[i])
    if not id then
      break
    end
    local key = ARGV[1] .. ':job:' .. id
    if redis.call('HGET', key, 'status') == 'queued' then
      local timeout = tonumber(redis.call('HGET', key, 'timeout_ms') or '0') or 0
      local lease = math.min(math.max(timeout, tonumber(ARGV[3])), tonumber(ARGV[5]))
      redis.call('HSET', key, 'status', 'processing', 'started_at', ARGV[2])
      redis.call('ZADD', KEYS[n + i], now + lease, id)
      return redis.call('HGETALL', key)
    end
  end
end
return false
"#,
    )
}

/// KEYS: job hash, leave key, enter key
/// ARGV: expected status, expected started_at, leave kind, enter kind,
///       enter score, id, field/value pairs...
///
/// Replies `ok`, `missing`, `status:<current>`, `stale` or `membership`.
pub(crate) fn apply() -> Script {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 'missing'
end
local status = redis.call('HGET', KEYS[1], 'status')
if status ~= ARGV[1] then
  return 'status:' .. tostring(status)
end
local started = redis.call('HGET', KEYS[1], 'started_at') or ''
if started ~= ARGV[2] then
  return 'stale'
end
if ARGV[3] == 'list' then
  if redis.call('LREM', KEYS[2], 1, ARGV[6]) == 0 then
    return 'membership'
  end
elseif ARGV[3] == 'zset' then
  if redis.call('ZREM', KEYS[2], ARGV[6]) == 0 then
    return 'membership'
  end
end
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], unpack(ARGV, 7))
if ARGV[4] == 'list' then
  redis.call('RPUSH', KEYS[3], ARGV[6])
elseif ARGV[4] == 'zset' then
  redis.call('ZADD', KEYS[3], ARGV[5], ARGV[6])
end
return 'ok'
"#,
    )
}

/// KEYS: scheduled set, ready list
/// ARGV: prefix, now ms, limit, status the job must have
pub(crate) fn promote() -> Script {
    Script::new(
        r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[2], 'LIMIT', 0, tonumber(ARGV[3]))
local promoted = {}
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  local key = ARGV[1] .. ':job:' .. id
  if redis.call('HGET', key, 'status') == ARGV[4] then
    redis.call('HSET', key, 'status', 'queued', 'error', '')
    redis.call('RPUSH', KEYS[2], id)
    table.insert(promoted, id)
  end
end
return promoted
"#,
    )
}

/// KEYS: in-flight set, retry set
/// ARGV: prefix, now ms, limit, reason, backoff base ms, backoff max ms
///
/// Replies a flat list of (id, retries or `dead`, retry-at ms) triples.
pub(crate) fn reap() -> Script {
    Script::new(
        r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[2], 'LIMIT', 0, tonumber(ARGV[3]))
local now = tonumber(ARGV[2])
local out = {}
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  local key = ARGV[1] .. ':job:' .. id
  if redis.call('HGET', key, 'status') == 'processing' then
    local retries = tonumber(redis.call('HGET', key, 'retries') or '0') or 0
    local max = tonumber(redis.call('HGET', key, 'max_retries') or '0') or 0
    if retries < max then
      retries = retries + 1
      local delay = math.min(tonumber(ARGV[5]) * (2 ^ math.min(retries - 1, 31)), tonumber(ARGV[6]))
      local at = now + delay
      redis.call('HSET', key, 'status', 'retry_wait', 'retries', retries, 'error', ARGV[4])
      redis.call('ZADD', KEYS[2], at, id)
      table.insert(out, id)
      table.insert(out, tostring(retries))
      table.insert(out, string.format('%d', at))
    else
      redis.call('HSET', key, 'status', 'dead', 'completed_at', ARGV[2], 'error', ARGV[4])
      table.insert(out, id)
      table.insert(out, 'dead')
      table.insert(out, '')
    end
  end
end
return out
"#,
    )
}
