mod register_discover_case;
mod subscription_case;
