#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use vmf_merge::diff::diff;
    use vmf_merge::prelude::*;

    fn solid(id: i32, side_id: i32, material: &str) -> String {
        format!(
            "\tsolid\n\t{{\n\
             \t\t\"id\" \"{id}\"\n\
             \t\tside\n\t\t{{\n\
             \t\t\t\"id\" \"{side_id}\"\n\
             \t\t\t\"plane\" \"(0 0 0) (64 0 0) (64 64 0)\"\n\
             \t\t\t\"material\" \"{material}\"\n\
             \t\t}}\n\
             \t\teditor\n\t\t{{\n\
             \t\t\t\"color\" \"0 180 0\"\n\
             \t\t}}\n\
             \t}}\n"
        )
    }

    fn vmf(mapversion: i32, world_body: &str, rest: &str) -> String {
        format!(
            "versioninfo\n{{\n\
             \t\"editorversion\" \"400\"\n\
             \t\"editorbuild\" \"8000\"\n\
             \t\"mapversion\" \"{mapversion}\"\n\
             \t\"formatversion\" \"100\"\n\
             \t\"prefab\" \"0\"\n\
             }}\n\
             visgroups\n{{\n}}\n\
             world\n{{\n\
             \t\"id\" \"1\"\n\
             \t\"mapversion\" \"{mapversion}\"\n\
             \t\"classname\" \"worldspawn\"\n\
             {world_body}\
             }}\n\
             {rest}"
        )
    }

    fn rendered(deltas: &[Delta]) -> Vec<String> {
        deltas.iter().map(|delta| delta.to_string()).collect()
    }

    fn rendered_set(deltas: &[Delta]) -> Vec<String> {
        let mut out = rendered(deltas);
        out.sort();
        out
    }

    #[test]
    fn identical_maps_diff_to_nothing() {
        let text = vmf(
            1,
            &(solid(2, 10, "DEV/DEV_MEASUREGENERIC01B") + &solid(3, 11, "TOOLS/TOOLSNODRAW")),
            "",
        );
        let mut parent = VmfMap::parse(&text).unwrap();
        let child = VmfMap::parse(&text).unwrap();

        assert!(diff(&mut parent, &child).is_empty());
    }

    #[test]
    fn changed_side_cascades_change_markers() {
        let parent_text = vmf(1, &solid(2, 10, "DEV/DEV_MEASUREGENERIC01B"), "");
        let child_text = vmf(2, &solid(2, 10, "BRICK/BRICKFLOOR001A"), "");
        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        assert_eq!(
            rendered(&deltas),
            vec![
                "ChangeObject(side, 10)",
                "ChangeObject(solid, 2)",
                "ChangeObject(world, 1)",
                "ChangeProperty(side, 10, \"material\", \"BRICK/BRICKFLOOR001A\")",
            ]
        );
    }

    #[test]
    fn removed_solid_records_cascaded_children() {
        let parent_text = vmf(
            1,
            &(solid(2, 10, "DEV/DEV_MEASUREGENERIC01B") + &solid(3, 11, "TOOLS/TOOLSNODRAW")),
            "",
        );
        let child_text = vmf(2, &solid(3, 11, "TOOLS/TOOLSNODRAW"), "");
        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        assert_eq!(
            rendered(&deltas),
            vec![
                "RemoveObject(solid, 2, [(side, 10)])",
                "RemoveObject(side, 10)",
            ]
        );
    }

    #[test]
    fn added_visgroup_with_membership() {
        let solids = solid(2, 10, "DEV/DEV_MEASUREGENERIC01B") + &solid(3, 11, "TOOLS/TOOLSNODRAW");
        let parent_text = vmf(1, &solids, "");

        // The child adds a VisGroup named "Test 1" and puts Solid 2 in it.
        let member_solid = "\tsolid\n\t{\n\
             \t\t\"id\" \"2\"\n\
             \t\tside\n\t\t{\n\
             \t\t\t\"id\" \"10\"\n\
             \t\t\t\"plane\" \"(0 0 0) (64 0 0) (64 64 0)\"\n\
             \t\t\t\"material\" \"DEV/DEV_MEASUREGENERIC01B\"\n\
             \t\t}\n\
             \t\teditor\n\t\t{\n\
             \t\t\t\"color\" \"0 180 0\"\n\
             \t\t\t\"visgroupid\" \"1\"\n\
             \t\t}\n\
             \t}\n"
            .to_string();
        let child_text = format!(
            "versioninfo\n{{\n\
             \t\"editorversion\" \"400\"\n\
             \t\"editorbuild\" \"8000\"\n\
             \t\"mapversion\" \"2\"\n\
             \t\"formatversion\" \"100\"\n\
             \t\"prefab\" \"0\"\n\
             }}\n\
             visgroups\n{{\n\
             \tvisgroup\n\t{{\n\
             \t\t\"name\" \"Test 1\"\n\
             \t\t\"visgroupid\" \"1\"\n\
             \t\t\"color\" \"100 117 234\"\n\
             \t}}\n\
             }}\n\
             world\n{{\n\
             \t\"id\" \"1\"\n\
             \t\"mapversion\" \"2\"\n\
             \t\"classname\" \"worldspawn\"\n\
             {}{}\
             }}\n",
            member_solid,
            solid(3, 11, "TOOLS/TOOLSNODRAW"),
        );

        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        let mut expected = vec![
            "AddObject(None, visgroup, 1)".to_string(),
            "AddProperty(visgroup, 1, \"name\", \"Test 1\")".to_string(),
            "AddProperty(visgroup, 1, \"color\", \"100 117 234\")".to_string(),
            "AddToVisGroup(solid, 2, 1)".to_string(),
        ];
        expected.sort();
        assert_eq!(rendered_set(&deltas), expected);
    }

    #[test]
    fn solid_tied_to_new_entity_emits_one_tie() {
        let parent_text = vmf(1, &solid(2, 10, "DEV/DEV_MEASUREGENERIC01B"), "");
        let child_entity = format!(
            "entity\n{{\n\
             \t\"id\" \"50\"\n\
             \t\"classname\" \"func_detail\"\n\
             {}\
             \teditor\n\t{{\n\
             \t\t\"color\" \"220 30 220\"\n\
             \t}}\n\
             }}\n",
            solid(2, 10, "DEV/DEV_MEASUREGENERIC01B")
        );
        let child_text = vmf(2, "", &child_entity);

        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        assert_eq!(
            rendered(&deltas),
            vec![
                "AddObject(None, entity, 1)",
                "AddProperty(entity, 1, \"classname\", \"func_detail\")",
                "AddProperty(entity, 1, \"editor\\\"::\\\"color\", \"220 30 220\")",
                "TieSolid(2, 1)",
            ]
        );

        // Applying restores the solid under the entity.
        parent.apply_deltas(&deltas, true).unwrap();
        assert_eq!(parent.tied_entity(2), Some(1));
        assert_eq!(
            parent.parent_of(VmfClass::Solid, 2),
            Some((VmfClass::Entity, 1))
        );
        assert_eq!(parent.revision(), 2);
    }

    #[test]
    fn untied_solid_emits_untie() {
        let parent_entity = format!(
            "entity\n{{\n\
             \t\"id\" \"50\"\n\
             \t\"classname\" \"func_detail\"\n\
             {}\
             }}\n",
            solid(2, 10, "DEV/DEV_MEASUREGENERIC01B")
        );
        let parent_text = vmf(1, "", &parent_entity);
        // The child dissolved the entity back into world geometry.
        let child_text = vmf(2, &solid(2, 10, "DEV/DEV_MEASUREGENERIC01B"), "");

        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        assert_eq!(
            rendered(&deltas),
            vec!["RemoveObject(entity, 50, [(solid, 2)])", "UntieSolid(2)"]
        );
    }

    #[test]
    fn cubemap_side_references_follow_new_side_ids() {
        let parent_text = vmf(1, &solid(2, 10, "DEV/DEV_MEASUREGENERIC01B"), "");
        // The child adds a new solid (side 20, child-side numbering) and a
        // cubemap pointing at both the old side and the new one.
        let cubemap = "entity\n{\n\
             \t\"id\" \"60\"\n\
             \t\"classname\" \"env_cubemap\"\n\
             \t\"sides\" \"10 20\"\n\
             }\n";
        let child_text = vmf(
            2,
            &(solid(2, 10, "DEV/DEV_MEASUREGENERIC01B") + &solid(4, 20, "TOOLS/TOOLSNODRAW")),
            cubemap,
        );

        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        // Side 20 is renumbered to the parent-side fresh ID 11, and the
        // cubemap's face list follows it.
        let sides_value = deltas
            .iter()
            .find_map(|delta| match &delta.change {
                Change::AddProperty { key, value, .. } if key == "sides" => value.as_str(),
                _ => None,
            })
            .unwrap();
        assert_eq!(sides_value, "10 11");
    }

    #[test]
    fn group_membership_follows_new_group_ids() {
        let parent_text = vmf(1, &solid(2, 10, "DEV/DEV_MEASUREGENERIC01B"), "");
        // The child groups a new solid under a new group (child-side id 7).
        let grouped_solid = "\tsolid\n\t{\n\
             \t\t\"id\" \"5\"\n\
             \t\tside\n\t\t{\n\
             \t\t\t\"id\" \"20\"\n\
             \t\t\t\"plane\" \"(0 0 0) (64 0 0) (64 64 0)\"\n\
             \t\t\t\"material\" \"TOOLS/TOOLSNODRAW\"\n\
             \t\t}\n\
             \t\teditor\n\t\t{\n\
             \t\t\t\"color\" \"0 180 0\"\n\
             \t\t\t\"groupid\" \"7\"\n\
             \t\t}\n\
             \t}\n\
             \tgroup\n\t{\n\
             \t\t\"id\" \"7\"\n\
             \t\teditor\n\t\t{\n\
             \t\t\t\"color\" \"0 180 0\"\n\
             \t\t}\n\
             \t}\n";
        let child_text = vmf(
            2,
            &(solid(2, 10, "DEV/DEV_MEASUREGENERIC01B").to_string() + grouped_solid),
            "",
        );

        let mut parent = VmfMap::parse(&parent_text).unwrap();
        let child = VmfMap::parse(&child_text).unwrap();

        let deltas = diff(&mut parent, &child);
        // The new group gets parent-side ID 1, and the new solid's
        // membership is rewritten to match.
        let group_value = deltas
            .iter()
            .find_map(|delta| match &delta.change {
                Change::AddProperty { key, value, .. } if key == "editor\"::\"groupid" => {
                    value.as_str()
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(group_value, "1");
    }
}
