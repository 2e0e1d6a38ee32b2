mod heartbeat_case;
