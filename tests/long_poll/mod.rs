mod gray_release_case;
mod notify_case;
mod timeout_case;
mod tombstone_case;
