mod command_case;
